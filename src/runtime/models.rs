//! Wire shapes for the platform and reporting APIs.
//!
//! Platform types only name the fields this crate reads; everything else is
//! kept in `extra` so cached payloads round-trip through the durable store
//! unchanged.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::core::TransportError;

/// Platform status code meaning success.
pub const PLATFORM_SUCCESS: i32 = 1;

/// Envelope wrapping every `/Platform/` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PlatformEnvelope<T> {
    /// The payload, absent on platform-level errors.
    #[serde(default = "Option::default")]
    pub response: Option<T>,
    /// Platform status code, `1` on success.
    #[serde(default)]
    pub error_code: i32,
    /// Seconds the caller should back off for, if throttled.
    #[serde(default)]
    pub throttle_seconds: i32,
    /// Symbolic status name.
    #[serde(default)]
    pub error_status: String,
    /// Human-readable status message.
    #[serde(default)]
    pub message: String,
}

impl<T> PlatformEnvelope<T> {
    /// Unwrap the payload, turning platform-level errors into `Decode`.
    pub fn into_response(self) -> Result<T, TransportError> {
        if self.error_code != 0 && self.error_code != PLATFORM_SUCCESS {
            return Err(TransportError::Decode(format!(
                "platform error {} ({}): {}",
                self.error_code, self.error_status, self.message
            )));
        }
        self.response
            .ok_or_else(|| TransportError::Decode("platform envelope has no Response".into()))
    }
}

/// Index of the game's definition tables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    /// Content version.
    pub version: String,
    /// Language -> full world content path.
    #[serde(default)]
    pub json_world_content_paths: HashMap<String, String>,
    /// Language -> table name -> component content path.
    #[serde(default)]
    pub json_world_component_content_paths: HashMap<String, HashMap<String, String>>,
    /// Remaining manifest fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Manifest {
    /// Content path for one definition table.
    pub fn component_path(&self, table: &str, language: &str) -> Option<&str> {
        self.json_world_component_content_paths
            .get(language)?
            .get(table)
            .map(String::as_str)
    }
}

/// Display strings shared by most definitions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayProperties {
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Description text.
    #[serde(default)]
    pub description: String,
    /// Relative icon path.
    #[serde(default)]
    pub icon: Option<String>,
}

/// One row of `DestinyActivityDefinition`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityDefinition {
    /// Definition hash.
    pub hash: u32,
    /// Names and icons.
    #[serde(default)]
    pub display_properties: DisplayProperties,
    /// Remaining fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Activity definitions keyed by hash.
pub type ActivityDefinitions = HashMap<String, ActivityDefinition>;

/// Summary block of a post-game carnage report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityDetails {
    /// Activity definition hash.
    pub reference_id: u32,
    /// Director activity hash.
    #[serde(default)]
    pub director_activity_hash: u32,
    /// Activity instance id.
    pub instance_id: String,
    /// Primary mode.
    #[serde(default)]
    pub mode: i32,
    /// Remaining fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Post-game carnage report for one activity instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostGameCarnageReport {
    /// ISO-8601 start time.
    pub period: String,
    /// Activity summary.
    pub activity_details: ActivityDetails,
    /// Per-player entries.
    #[serde(default)]
    pub entries: Vec<Value>,
    /// Remaining fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Group (clan) summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupSummary {
    /// Group id.
    pub group_id: String,
    /// Group name.
    pub name: String,
    /// Motto.
    #[serde(default)]
    pub motto: String,
    /// Member count.
    #[serde(default)]
    pub member_count: i32,
    /// Remaining fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One group the member belongs to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupMembership {
    /// The group.
    pub group: GroupSummary,
    /// Membership details.
    #[serde(default)]
    pub member: Value,
}

/// Groups a member belongs to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupsForMember {
    /// Memberships found.
    #[serde(default)]
    pub results: Vec<GroupMembership>,
    /// Total result count.
    #[serde(default)]
    pub total_results: i32,
    /// More pages exist.
    #[serde(default)]
    pub has_more: bool,
}

/// Player as known to the reporting service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerDto {
    /// Membership id.
    pub id: String,
    /// Platform membership type.
    pub membership_type: i32,
    /// Bungie name without code.
    pub display_name: String,
    /// Numeric name code.
    pub display_name_code: i32,
    /// Emblem icon path.
    #[serde(default)]
    pub last_played_character_emblem_path: Option<String>,
    /// Emblem background path.
    #[serde(default)]
    pub last_played_character_background_path: Option<String>,
    /// `name#code`.
    pub full_display_name: String,
}

/// Tracked activity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityDto {
    /// Activity id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Artwork URL.
    #[serde(rename = "imageURL")]
    pub image_url: String,
    /// Sort index.
    pub index: i32,
    /// Owning operation type.
    pub op_type_id: i64,
}

/// Operation type grouping activities.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpTypeDto {
    /// Op type id.
    pub id: i64,
    /// Display name.
    pub name: String,
    /// Activities in this op type.
    #[serde(default)]
    pub activities: Vec<ActivityDto>,
}

/// One recorded activity run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityReportDto {
    /// Report id.
    pub id: String,
    /// Activity instance id.
    pub instance_id: String,
    /// ISO-8601 timestamp.
    pub date: String,
    /// Player id.
    pub player_id: String,
    /// Activity id.
    pub activity_id: String,
    /// Whether the run was completed.
    pub completed: bool,
    /// Run duration as reported.
    pub duration: String,
    /// Player, when expanded.
    #[serde(default)]
    pub player: Option<PlayerDto>,
}

/// Result of asking the reporting service to reload a player's history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityLoadResponse {
    /// Whether the reload was accepted.
    pub success: bool,
}

/// One leaderboard row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    /// Ranked player.
    pub player: PlayerDto,
    /// 1-based rank.
    pub rank: u32,
    /// Score: completion count or formatted time.
    pub data: String,
}

/// Body of the player search request.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerSearchRequest<'a> {
    /// Name fragment to search for.
    pub player_name: &'a str,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_error_code_becomes_decode_error() {
        let env: PlatformEnvelope<Value> = serde_json::from_str(
            r#"{"ErrorCode":5,"ErrorStatus":"SystemDisabled","Message":"Maintenance","ThrottleSeconds":0}"#,
        )
        .unwrap();
        let err = env.into_response().unwrap_err();
        assert!(matches!(err, TransportError::Decode(msg) if msg.contains("SystemDisabled")));
    }

    #[test]
    fn manifest_keeps_unknown_fields() {
        let raw = r#"{
            "version": "1.2.3",
            "mobileAssetContentPath": "/common/x.content",
            "jsonWorldComponentContentPaths": {
                "en": { "DestinyActivityDefinition": "/common/en/activity.json" }
            }
        }"#;
        let manifest: Manifest = serde_json::from_str(raw).unwrap();
        assert_eq!(
            manifest.component_path("DestinyActivityDefinition", "en"),
            Some("/common/en/activity.json")
        );
        assert_eq!(manifest.component_path("DestinyActivityDefinition", "fr"), None);
        let again = serde_json::to_value(&manifest).unwrap();
        assert_eq!(again["mobileAssetContentPath"], "/common/x.content");
    }

    #[test]
    fn activity_dto_uses_image_url_casing() {
        let dto: ActivityDto = serde_json::from_str(
            r#"{"id":"a1","name":"Vault","imageURL":"/img.png","index":2,"opTypeId":3}"#,
        )
        .unwrap();
        assert_eq!(dto.image_url, "/img.png");
        assert_eq!(dto.op_type_id, 3);
    }
}
