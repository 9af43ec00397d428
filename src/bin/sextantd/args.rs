// Copyright 2022 Matthew Ingwersen.
//
// Licensed under the Apache License, Version 2.0 (the "License"); you
// may not use this file except in compliance with the License. You may
// obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or
// implied. See the License for the specific language governing
// permissions and limitations under the License.

use std::net::IpAddr;
use std::path::PathBuf;

use clap::{ArgGroup, Parser, Subcommand};

pub fn parse() -> Args {
    Args::parse()
}

#[derive(Debug, Parser)]
#[command(author, version)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the server
    Run(RunArgs),

    /// Summarize the events in an analytics file
    Stats(StatsArgs),
}

#[derive(Debug, clap::Args)]
#[command(group(ArgGroup::new("source").required(true).args(["config", "zone_file"])))]
pub struct RunArgs {
    /// Set the configuration file to use
    #[arg(
        long,
        conflicts_with_all = ["bind", "port", "secondaries", "analytics_file"],
        value_name = "FILE"
    )]
    pub config: Option<PathBuf>,

    /// Set the zone file to serve
    #[arg(long, value_name = "FILE")]
    pub zone_file: Option<PathBuf>,

    /// Set the server bind IP address
    #[arg(long, value_name = "IP")]
    pub bind: Option<IpAddr>,

    /// Set the server port (for both UDP and TCP)
    #[arg(long, value_name = "PORT")]
    pub port: Option<u16>,

    /// Allow a secondary to transfer the zone (may be repeated)
    #[arg(long = "secondary", value_name = "IP")]
    pub secondaries: Vec<IpAddr>,

    /// Append analytics events to a file
    #[arg(long, value_name = "FILE")]
    pub analytics_file: Option<PathBuf>,
}

#[derive(Debug, clap::Args)]
pub struct StatsArgs {
    /// The analytics file to summarize
    #[arg(value_name = "FILE")]
    pub analytics_file: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_requires_a_source() {
        assert!(Args::try_parse_from(["sextantd", "run"]).is_err());
        assert!(Args::try_parse_from(["sextantd", "run", "--config", "a.toml", "--port", "53"])
            .is_err());
    }

    #[test]
    fn run_accepts_command_line_configuration() {
        let args = Args::try_parse_from([
            "sextantd",
            "run",
            "--zone-file",
            "example.zone",
            "--port",
            "5353",
            "--secondary",
            "192.0.2.1",
            "--secondary",
            "2001:db8::1",
        ])
        .unwrap();
        match args.command {
            Command::Run(run_args) => {
                assert_eq!(run_args.zone_file, Some(PathBuf::from("example.zone")));
                assert_eq!(run_args.port, Some(5353));
                assert_eq!(run_args.secondaries.len(), 2);
                assert!(run_args.bind.is_none());
            }
            other => panic!("unexpected command {:?}", other),
        }
    }
}
