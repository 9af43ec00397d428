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

use std::fmt::{self, Write};
use std::fs;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use log::Level::Debug;
use log::{debug, log_enabled};
use paste::paste;
use serde::{de, Deserialize};

use sextant::message::tsig::{Algorithm, KeyStore, TsigKey};
use sextant::server::{TransferConfig, DEFAULT_TRANSFER_TIMEOUT};

use crate::args::RunArgs;

////////////////////////////////////////////////////////////////////////
// LOADING                                                            //
////////////////////////////////////////////////////////////////////////

/// Loads the configuration file at `path`.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<Config> {
    let dir = match path.as_ref().parent() {
        Some(p) => p,
        None => return Err(anyhow!("the configuration file path has no parent")),
    };
    let raw_config =
        fs::read_to_string(path.as_ref()).context("failed to read the configuration file")?;
    let config = parse(&raw_config, dir)?;
    log_config_summary(&config);
    Ok(config)
}

/// Parses a configuration. Relative paths are interpreted relative to
/// `dir`, the configuration file's directory.
fn parse(raw_config: &str, dir: &Path) -> Result<Config> {
    let mut config: Config =
        toml::from_str(raw_config).context("failed to parse the configuration file")?;
    if config.zone_file.is_relative() {
        config.zone_file = dir.join(&config.zone_file);
    }
    if let Some(ref mut analytics_file) = config.analytics_file {
        if analytics_file.is_relative() {
            *analytics_file = dir.join(&*analytics_file);
        }
    }
    config.validate()?;
    Ok(config)
}

/// Builds the configuration from command-line arguments.
pub fn load_from_args(args: RunArgs) -> Result<Config> {
    let zone_file = args
        .zone_file
        .ok_or_else(|| anyhow!("no zone file was provided"))?;
    let config = Config {
        bind: args.bind.unwrap_or(DEFAULT_BIND_IP),
        port: args.port.unwrap_or(DEFAULT_PORT),
        zone_file,
        analytics_file: args.analytics_file,
        axfr: AxfrConfig {
            secondaries: args.secondaries,
            ..AxfrConfig::default()
        },
        tsig_keys: Vec::new(),
    };
    log_config_summary(&config);
    Ok(config)
}

fn log_config_summary(config: &Config) {
    if !log_enabled!(Debug) {
        // Don't compute the message if it will never be printed.
        return;
    }

    let mut message = format!(
        "Configuration loaded:\n\
         Bind address: {}\n\
         Zone file:    {}\n\
         Analytics:    ",
        config.bind_addr(),
        config.zone_file.display(),
    );
    match config.analytics_file {
        Some(ref path) => message.push_str(&path.display().to_string()),
        None => message.push_str("log only"),
    }
    message.push_str("\nSecondaries:  ");
    if config.axfr.secondaries.is_empty() {
        message.push_str("none");
    } else {
        for (i, ip) in config.axfr.secondaries.iter().enumerate() {
            if i > 0 {
                message.push_str(", ");
            }
            let _ = write!(message, "{}", ip);
        }
    }
    let _ = write!(message, "\nTSIG keys:    {}", config.tsig_keys.len());
    debug!("{}", message);
}

////////////////////////////////////////////////////////////////////////
// CONFIGURATION STRUCTURE                                            //
////////////////////////////////////////////////////////////////////////

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default = "default_bind")]
    pub bind: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
    pub zone_file: PathBuf,
    pub analytics_file: Option<PathBuf>,
    #[serde(default)]
    pub axfr: AxfrConfig,
    #[serde(default)]
    pub tsig_keys: Vec<TsigKeyConfig>,
}

const DEFAULT_BIND_IP: IpAddr = IpAddr::V4(Ipv4Addr::UNSPECIFIED);
const DEFAULT_PORT: u16 = 8053;

fn default_bind() -> IpAddr {
    DEFAULT_BIND_IP
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

impl Config {
    /// Returns the address to bind both the UDP socket and the TCP
    /// listener to.
    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind, self.port)
    }

    /// Checks the settings that deserialization alone can't.
    fn validate(&self) -> Result<()> {
        for key in &self.tsig_keys {
            BASE64
                .decode(&key.secret)
                .with_context(|| format!("invalid secret for TSIG key {}", key.name))?;
        }
        if let Some(ref signing_key) = self.axfr.signing_key {
            if !self.tsig_keys.iter().any(|k| k.matches(signing_key)) {
                return Err(anyhow!(
                    "the AXFR signing key {} is not among the TSIG keys",
                    signing_key
                ));
            }
        }
        Ok(())
    }

    /// Builds the server's zone-transfer settings.
    pub fn transfer_config(&self) -> TransferConfig {
        TransferConfig {
            secondaries: self.axfr.secondaries.clone(),
            keys: self.tsig_keys.iter().map(TsigKeyConfig::to_key).collect::<KeyStore>(),
            signing_key: self.axfr.signing_key.clone(),
            timeout: Duration::from_secs(self.axfr.timeout),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AxfrConfig {
    #[serde(default)]
    pub secondaries: Vec<IpAddr>,
    pub signing_key: Option<String>,
    #[serde(default = "default_axfr_timeout")]
    pub timeout: u64,
}

fn default_axfr_timeout() -> u64 {
    DEFAULT_TRANSFER_TIMEOUT.as_secs()
}

impl Default for AxfrConfig {
    fn default() -> Self {
        Self {
            secondaries: Vec::new(),
            signing_key: None,
            timeout: default_axfr_timeout(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TsigKeyConfig {
    pub name: String,
    pub algorithm: ConfigAlgorithm,
    pub secret: String,
}

impl TsigKeyConfig {
    fn to_key(&self) -> TsigKey {
        TsigKey::new(&*self.name, self.algorithm.0.name(), &*self.secret)
    }

    fn matches(&self, name: &str) -> bool {
        sextant::name::eq_ignore_case(&self.name, name)
    }
}

////////////////////////////////////////////////////////////////////////
// WRAPPERS FOR DESERIALIZATION                                       //
////////////////////////////////////////////////////////////////////////

macro_rules! make_serde_wrapper {
    ($wrapper:ident, $over:ty, $description:literal) => {
        /// A macro-generated deserializable wrapper over a [`sextant`]
        /// type.
        #[derive(Clone, Debug)]
        pub struct $wrapper(pub $over);

        impl<'de> Deserialize<'de> for $wrapper {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: de::Deserializer<'de>,
            {
                deserializer.deserialize_str(paste! { [<$wrapper Visitor>] })
            }
        }

        paste! {
            /// A macro-generated [`Visitor`](de::Visitor).
            #[derive(Debug)]
            struct [<$wrapper Visitor>];
        }

        impl<'de> de::Visitor<'de> for paste! { [<$wrapper Visitor>] } {
            type Value = $wrapper;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str($description)
            }

            fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                value
                    .parse()
                    .map($wrapper)
                    .map_err(|e| E::custom(format!("invalid {}: {}", $description, e)))
            }
        }
    };
}

make_serde_wrapper!(ConfigAlgorithm, Algorithm, "TSIG algorithm");

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////
