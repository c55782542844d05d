use std::net::IpAddr;
use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand, ValueEnum};

#[derive(Parser, Debug)]
#[command(name = "netft", version, about = "ATI NETrs force/torque acquisition")]
pub struct Cli {
    /// Path to preferences TOML (optional; defaults apply without it)
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Log as JSON lines instead of pretty
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Log level: trace,debug,info,warn,error
    #[arg(long, value_name = "LEVEL", default_value = "info")]
    pub log_level: String,

    /// Mirror logs into this file
    #[arg(long, value_name = "FILE")]
    pub log_file: Option<String>,

    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum FormatArg {
    Csv,
    Tsv,
    ExcelCompatible,
}

impl From<FormatArg> for netft_core::formats::LogFormat {
    fn from(f: FormatArg) -> Self {
        match f {
            FormatArg::Csv => Self::Csv,
            FormatArg::Tsv => Self::Tsv,
            FormatArg::ExcelCompatible => Self::ExcelCompatible,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Stream samples and print live statistics
    Stream {
        /// Sensor IP address
        #[arg(long)]
        ip: IpAddr,
        /// Stop after this many seconds (default: run until killed)
        #[arg(long, value_name = "SECS")]
        seconds: Option<u64>,
    },
    /// Stream and write a log file
    Record {
        #[arg(long)]
        ip: IpAddr,
        /// Output directory
        #[arg(long, value_name = "DIR")]
        output: PathBuf,
        /// Log format
        #[arg(long, value_enum, default_value_t = FormatArg::Csv)]
        format: FormatArg,
        /// Filename prefix (sanitized)
        #[arg(long, default_value = "")]
        prefix: String,
        /// Recording length in seconds
        #[arg(long, value_name = "SECS", default_value_t = 10)]
        seconds: u64,
    },
    /// Read and print the sensor calibration
    Calibration {
        #[arg(long)]
        ip: IpAddr,
    },
    /// Apply bias (tare)
    Bias {
        #[arg(long)]
        ip: IpAddr,
        /// Capture local soft-zero offsets instead of a device tare
        #[arg(long, action = ArgAction::SetTrue)]
        soft: bool,
        /// Stream seconds to observe before/after values
        #[arg(long, default_value_t = 2)]
        seconds: u64,
    },
    /// Write a tool transform to the sensor (mm / degrees)
    Transform {
        #[arg(long)]
        ip: IpAddr,
        #[arg(long, default_value_t = 0.0)]
        dx: f64,
        #[arg(long, default_value_t = 0.0)]
        dy: f64,
        #[arg(long, default_value_t = 0.0)]
        dz: f64,
        #[arg(long, default_value_t = 0.0)]
        rx: f64,
        #[arg(long, default_value_t = 0.0)]
        ry: f64,
        #[arg(long, default_value_t = 0.0)]
        rz: f64,
    },
    /// Run the loopback sensor simulator
    Simulate {
        #[arg(long, default_value_t = 49152)]
        udp_port: u16,
        #[arg(long, default_value_t = 49151)]
        tcp_port: u16,
        #[arg(long, default_value_t = 8080)]
        http_port: u16,
        /// Sample rate in Hz
        #[arg(long, default_value_t = 1000)]
        rate: u32,
        /// Counts per force
        #[arg(long, default_value_t = 1_000_000)]
        cpf: u32,
        /// Counts per torque
        #[arg(long, default_value_t = 1_000_000)]
        cpt: u32,
    },
}
