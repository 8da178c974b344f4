// THEORY:
// The aggregator is the last stage of an analysis pass. It applies the brightness
// reducer to every region in order and snapshots each measured region into a flat
// `ResultRecord`. The output order is the region order, and a pass always produces
// a complete, fresh result set; callers replace their previous results with it.

use log::info;

use crate::core_modules::brightness::{BrightnessMethod, measure};
use crate::core_modules::intensity_grid::IntensityGrid;
use crate::core_modules::record::ResultRecord;
use crate::core_modules::region::Region;
use crate::error::{AnalysisError, Result};

/// Measures every region and returns one record per region, in region order.
///
/// Fails with `InvalidState` when there are no regions. The first region that does
/// not fit the grid aborts the pass, and then no region is updated.
pub fn analyze_all(
    grid: &IntensityGrid,
    regions: &mut [Region],
    method: BrightnessMethod,
) -> Result<Vec<ResultRecord>> {
    if regions.is_empty() {
        return Err(AnalysisError::invalid_state(
            "no cells defined; add cells before analyzing",
        ));
    }

    // Measure everything before touching the regions, so a failing pass leaves
    // them as they were.
    let values = regions
        .iter()
        .map(|region| measure(grid, region, method))
        .collect::<Result<Vec<_>>>()?;

    let records: Vec<ResultRecord> = regions
        .iter_mut()
        .zip(values)
        .map(|(region, brightness)| {
            region.brightness = Some(brightness);
            ResultRecord::new(region, brightness)
        })
        .collect();

    info!("analyzed {} cells ({method})", records.len());
    Ok(records)
}
