//! Operator configuration.
//!
//! ```
//! use ironbeam_cogroup::config::CoGroupConfig;
//! use ironbeam_cogroup::runner::ExecMode;
//!
//! let cfg = CoGroupConfig::from_json_str(r#"{ "serializer": "json", "exec_mode": { "mode": "sequential" } }"#)?;
//! assert_eq!(cfg.serializer, "json");
//! assert_eq!(cfg.exec_mode, ExecMode::Sequential);
//! assert_eq!(cfg.interrupt_check_interval, 1);
//! # Ok::<(), anyhow::Error>(())
//! ```

use crate::runner::ExecMode;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoGroupConfig {
    /// Registry name of the serializer used for shuffle reads.
    pub serializer: String,
    pub exec_mode: ExecMode,
    /// Records read between two polls of the task's interrupt flag.
    pub interrupt_check_interval: usize,
}

impl Default for CoGroupConfig {
    fn default() -> Self {
        Self {
            serializer: "postcard".to_string(),
            exec_mode: ExecMode::Parallel { threads: None },
            interrupt_check_interval: 1,
        }
    }
}

impl CoGroupConfig {
    /// Parse a JSON document; missing fields take their defaults.
    ///
    /// # Errors
    /// Fails on malformed JSON or mistyped fields.
    pub fn from_json_str(s: &str) -> Result<Self> {
        serde_json::from_str(s).context("invalid co-group config")
    }
}
