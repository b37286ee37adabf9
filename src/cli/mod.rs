use clap::{Parser, Subcommand};

/// One line typed on the CSC console.
#[derive(Debug, Parser)]
#[command(no_binary_name = true, disable_help_flag = true, disable_version_flag = true)]
pub struct ConsoleLine {
    #[command(subcommand)]
    pub command: ConsoleCommand,
}

impl ConsoleLine {
    pub fn parse_line(line: &str) -> Result<ConsoleCommand, clap::Error> {
        Self::try_parse_from(line.split_whitespace()).map(|parsed| parsed.command)
    }
}

#[derive(Debug, Clone, PartialEq, Subcommand)]
#[command(rename_all = "camelCase")]
pub enum ConsoleCommand {
    /// Standby -> Disabled, optionally naming a config file in the config dir
    Start { config_override: Option<String> },

    Enable,

    Disable,

    Standby,

    ExitControl,

    /// Close up to four gates; -1 leaves a slot unused
    CloseVentGate {
        #[arg(num_args = 4, required = true, allow_negative_numbers = true)]
        gates: Vec<i32>,
    },

    /// Open up to four gates; -1 leaves a slot unused
    OpenVentGate {
        #[arg(num_args = 4, required = true, allow_negative_numbers = true)]
        gates: Vec<i32>,
    },

    ResetExtractionFanDrive,

    SetExtractionFanDriveFreq {
        #[arg(allow_negative_numbers = true)]
        target_frequency: f64,
    },

    SetExtractionFanManualControlMode {
        #[arg(action = clap::ArgAction::Set, value_parser = clap::builder::BoolishValueParser::new())]
        enable_manual_control_mode: bool,
    },

    StartExtractionFan,

    StopExtractionFan,

    /// Print the summary state and connection status
    State,
}

impl ConsoleCommand {
    pub fn name(&self) -> &'static str {
        match self {
            ConsoleCommand::Start { .. } => "start",
            ConsoleCommand::Enable => "enable",
            ConsoleCommand::Disable => "disable",
            ConsoleCommand::Standby => "standby",
            ConsoleCommand::ExitControl => "exitControl",
            ConsoleCommand::CloseVentGate { .. } => "closeVentGate",
            ConsoleCommand::OpenVentGate { .. } => "openVentGate",
            ConsoleCommand::ResetExtractionFanDrive => "resetExtractionFanDrive",
            ConsoleCommand::SetExtractionFanDriveFreq { .. } => "setExtractionFanDriveFreq",
            ConsoleCommand::SetExtractionFanManualControlMode { .. } => {
                "setExtractionFanManualControlMode"
            }
            ConsoleCommand::StartExtractionFan => "startExtractionFan",
            ConsoleCommand::StopExtractionFan => "stopExtractionFan",
            ConsoleCommand::State => "state",
        }
    }
}
