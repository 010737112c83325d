use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

pub type Result<T> = anyhow::Result<T>;

pub fn runtime_dir(workspace: &Path) -> PathBuf {
    workspace.join(".evolve")
}

/// A proposed change, as handed to the gate by an upstream producer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchRequest {
    pub id: Uuid,
    pub raw_content: String,
}

impl PatchRequest {
    pub fn new(raw_content: impl Into<String>) -> Self {
        Self {
            id: Uuid::now_v7(),
            raw_content: raw_content.into(),
        }
    }
}

/// How a patch is materialized onto disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ApplyStrategy {
    /// Unified diff applied by the external VCS tool (check, then apply).
    GitApply,
    /// A single SEARCH/REPLACE block applied in-process to `path`.
    SearchReplace { path: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Applied,
    RejectedByApplier,
    RejectedByQuality,
}

impl OutcomeStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Applied => "applied",
            Self::RejectedByApplier => "rejected_by_applier",
            Self::RejectedByQuality => "rejected_by_quality",
        }
    }
}

impl std::fmt::Display for OutcomeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal record of one gate run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatchOutcome {
    pub patch_id: Uuid,
    pub status: OutcomeStatus,
    pub pre_toxicity: f64,
    pub post_toxicity: f64,
    #[serde(default)]
    pub target_files: Vec<String>,
    /// Diagnostic lines from the applier when it refused the patch.
    #[serde(default)]
    pub conflicts: Vec<String>,
}

impl PatchOutcome {
    pub fn is_applied(&self) -> bool {
        self.status == OutcomeStatus::Applied
    }

    /// Positive when the change made the code more toxic.
    pub fn delta(&self) -> f64 {
        self.post_toxicity - self.pre_toxicity
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub scoring: ScoringConfig,
    pub git: GitConfig,
    pub telemetry: TelemetryConfig,
}

impl AppConfig {
    pub fn user_settings_path() -> Option<PathBuf> {
        let home = std::env::var("HOME")
            .ok()
            .or_else(|| std::env::var("USERPROFILE").ok())?;
        Some(Path::new(&home).join(".evolve/settings.json"))
    }

    pub fn project_settings_path(workspace: &Path) -> PathBuf {
        runtime_dir(workspace).join("settings.json")
    }

    pub fn project_local_settings_path(workspace: &Path) -> PathBuf {
        runtime_dir(workspace).join("settings.local.json")
    }

    pub fn legacy_toml_path(workspace: &Path) -> PathBuf {
        runtime_dir(workspace).join("config.toml")
    }

    pub fn load(workspace: &Path) -> Result<Self> {
        Self::load_layers(workspace, Self::user_settings_path().as_deref())
    }

    /// Merge every configuration layer present on disk over the defaults.
    /// Later layers win key by key.
    pub fn load_layers(workspace: &Path, user_settings: Option<&Path>) -> Result<Self> {
        let mut merged = serde_json::to_value(Self::default())?;

        let legacy = Self::legacy_toml_path(workspace);
        if legacy.exists() {
            let raw = fs::read_to_string(legacy)?;
            let legacy_cfg: AppConfig = toml::from_str(&raw)?;
            merge_json_value(&mut merged, &serde_json::to_value(legacy_cfg)?);
        }

        let mut paths = Vec::new();
        if let Some(user) = user_settings {
            paths.push(user.to_path_buf());
        }
        paths.push(Self::project_settings_path(workspace));
        paths.push(Self::project_local_settings_path(workspace));

        for path in paths {
            if !path.exists() {
                continue;
            }
            let raw = fs::read_to_string(path)?;
            let value: serde_json::Value = serde_json::from_str(&raw)?;
            merge_json_value(&mut merged, &value);
        }

        Ok(serde_json::from_value(merged)?)
    }

    pub fn save(&self, workspace: &Path) -> Result<()> {
        let path = Self::project_settings_path(workspace);
        fs::create_dir_all(
            path.parent()
                .ok_or_else(|| anyhow::anyhow!("invalid config path"))?,
        )?;
        fs::write(path, serde_json::to_vec_pretty(self)?)?;
        Ok(())
    }
}

fn merge_json_value(base: &mut serde_json::Value, overlay: &serde_json::Value) {
    match (base, overlay) {
        (serde_json::Value::Object(base_obj), serde_json::Value::Object(overlay_obj)) => {
            for (key, overlay_value) in overlay_obj {
                if let Some(base_value) = base_obj.get_mut(key) {
                    merge_json_value(base_value, overlay_value);
                } else {
                    base_obj.insert(key.clone(), overlay_value.clone());
                }
            }
        }
        (base_slot, overlay_value) => {
            *base_slot = overlay_value.clone();
        }
    }
}

/// Weights and policy constants for the toxicity score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub complexity_weight: f64,
    pub loc_weight: f64,
    /// Average complexity used when a file has no function or method blocks.
    pub default_complexity: f64,
    /// Complexity charged to text that does not parse.
    pub parse_failure_complexity: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            complexity_weight: 2.0,
            loc_weight: 0.1,
            default_complexity: 1.0,
            parse_failure_complexity: 25.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GitConfig {
    /// Executable used for `apply --check` / `apply`.
    pub program: String,
    /// Upper bound in seconds for each subprocess; `None` waits for
    /// completion. Values below 1 are raised to 1.
    pub timeout_seconds: Option<u64>,
}

impl Default for GitConfig {
    fn default() -> Self {
        Self {
            program: "git".to_string(),
            timeout_seconds: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct TelemetryConfig {
    pub enabled: bool,
    pub endpoint: Option<String>,
}
