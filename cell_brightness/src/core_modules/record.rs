use serde::{Deserialize, Serialize};

use crate::core_modules::region::Region;

/// A flat, immutable snapshot of one measured region.
///
/// Field order is the tabular column order: `cell_id, x, y, width, height,
/// brightness`, followed by `image_name` for records produced in batch mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRecord {
    pub cell_id: String,
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    pub brightness: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_name: Option<String>,
}

impl ResultRecord {
    pub fn new(region: &Region, brightness: f64) -> Self {
        Self {
            cell_id: region.id.clone(),
            x: region.x,
            y: region.y,
            width: region.width,
            height: region.height,
            brightness,
            image_name: None,
        }
    }

    pub fn with_image_name(mut self, image_name: impl Into<String>) -> Self {
        self.image_name = Some(image_name.into());
        self
    }
}
