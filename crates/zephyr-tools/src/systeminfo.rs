//! `systeminfo`: facts about the host and the serving process.

use crate::args::{optional_bool, schema_object};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::env;
use std::path::Path;
use tokio_util::sync::CancellationToken;
use zephyr_core::{Arguments, JsonObject, Result, ToolOutput};
use zephyr_plugin::DynamicPlugin;

/// Reports OS, architecture, CPU count and process details.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemInfo;

impl SystemInfo {
    /// Tool name.
    pub const NAME: &'static str = "systeminfo";

    /// Collects the report; `detailed` adds host and path details.
    #[must_use]
    pub fn collect(detailed: bool) -> Value {
        let cpus = std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get);
        let mut info = json!({
            "os": env::consts::OS,
            "arch": env::consts::ARCH,
            "family": env::consts::FAMILY,
            "cpus": cpus,
            "pid": std::process::id(),
        });

        if detailed {
            let hostname = env::var("HOSTNAME")
                .or_else(|_| env::var("COMPUTERNAME"))
                .ok();
            info["hostname"] = json!(hostname);
            info["current_dir"] = json!(env::current_dir().ok().as_deref().map(display));
            info["temp_dir"] = json!(display(&env::temp_dir()));
            info["exe"] = json!(env::current_exe().ok().as_deref().map(display));
        }
        info
    }
}

fn display(path: &Path) -> String {
    path.display().to_string()
}

#[async_trait]
impl DynamicPlugin for SystemInfo {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn version(&self) -> &str {
        env!("CARGO_PKG_VERSION")
    }

    fn description(&self) -> &str {
        "Get system information: OS, architecture, CPU count and process details"
    }

    fn input_schema(&self) -> JsonObject {
        schema_object(json!({
            "type": "object",
            "properties": {
                "detailed": {
                    "type": "boolean",
                    "description": "Include hostname, working directory and executable path",
                    "default": false,
                },
            },
        }))
    }

    async fn execute(&self, _ct: CancellationToken, args: Arguments) -> Result<ToolOutput> {
        let detailed = optional_bool(&args, "detailed")?.unwrap_or(false);
        Ok(ToolOutput::structured(Self::collect(detailed)))
    }
}
