//! Quick-order presets shown by the control surface.

use serde::{Deserialize, Serialize};

use crate::decimal::Volume;
use crate::order::OrderSide;

/// A saved side/volume preset. Not read by the trigger engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuickButton {
    pub id: u64,
    #[serde(default)]
    pub name: Option<String>,
    pub order_type: OrderSide,
    pub volume: Volume,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewButton {
    #[serde(default)]
    pub name: Option<String>,
    pub order_type: OrderSide,
    pub volume: Volume,
}
