pub mod check;
pub mod runtime;
pub mod serve;
pub mod validate;

pub use check::{cmd_check, CheckArgs};
pub use runtime::init_logging;
pub use serve::{cmd_serve, ServeArgs};
pub use validate::{cmd_validate, ValidateArgs};

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    Human,
    Json,
    Yaml,
}

impl OutputFormat {
    /// Renders `report` for the machine-readable formats.
    pub fn render(self, report: &serde_json::Value) -> anyhow::Result<Option<String>> {
        Ok(match self {
            OutputFormat::Human => None,
            OutputFormat::Json => Some(serde_json::to_string_pretty(report)?),
            OutputFormat::Yaml => Some(serde_yaml::to_string(report)?),
        })
    }
}
