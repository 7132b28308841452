use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::models::BlockedDay;

#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NewBlockedDayRequest {
    #[serde(default)]
    #[schema(example = "2025-01-21")]
    pub date: String,
    #[serde(default)]
    #[schema(example = "10:00")]
    pub open_time: String,
    #[serde(default)]
    #[schema(example = "13:00")]
    pub close_time: String,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BlockedDayList {
    pub blocked_days: Vec<BlockedDay>,
}
