// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::runtime::{
    fail::Fail,
    limits,
    types::Policy,
};
use ::std::{
    fs::File,
    io::Read,
    ops::Index,
    str::FromStr,
};
use ::yaml_rust::{
    Yaml,
    YamlLoader,
};

//======================================================================================================================
// Constants
//======================================================================================================================

// Tick accounting options.
mod ticksched_config {
    pub const SECTION_NAME: &str = "ticksched";
    // Accounting-set size.
    pub const UNITS_PER_SET: &str = "units_per_set";
    // Online-unit count above which dispatch goes multi-threaded.
    pub const MULTITHREAD_THRESHOLD: &str = "multithread_threshold";
    // Initial processor selection policy.
    pub const POLICY: &str = "policy";
}

//======================================================================================================================
// Structures
//======================================================================================================================

/// Tick accounting configuration file.
#[derive(Clone, Debug)]
pub struct Config(pub Yaml);

/// Validated configuration parameters, applied at initialization and not hot-reloadable.
#[derive(Clone, Copy, Debug)]
pub struct ConfigParams {
    /// Accounting-set size.
    pub units_per_set: usize,
    /// Online-unit count above which dispatch goes multi-threaded.
    pub multithread_threshold: usize,
    /// Initial processor selection policy.
    pub policy: Policy,
}

//======================================================================================================================
// Associated Functions
//======================================================================================================================

/// Common associated functions for the configuration object.
impl Config {
    /// Reads a configuration file into a [Config] object.
    pub fn new(config_path: String) -> Result<Self, Fail> {
        let mut config_s: String = String::new();
        File::open(config_path)?.read_to_string(&mut config_s)?;
        let config: Vec<Yaml> = match YamlLoader::load_from_str(&config_s) {
            Ok(config) => config,
            Err(e) => {
                let cause: String = format!("cannot parse config file: {:?}", e);
                error!("new(): {}", cause);
                return Err(Fail::new(libc::EINVAL, &cause));
            },
        };
        let config_obj: &Yaml = match &config[..] {
            [c] => c,
            _ => return Err(Fail::new(libc::EINVAL, "wrong number of config objects")),
        };

        Ok(Self(config_obj.clone()))
    }

    fn get_ticksched_config(&self) -> Result<&Yaml, Fail> {
        Self::get_subsection(&self.0, ticksched_config::SECTION_NAME)
    }

    /// Reads the accounting-set size, environment variable first, then the configuration file.
    pub fn units_per_set(&self) -> Result<usize, Fail> {
        if let Some(value) = Self::get_typed_env_option(ticksched_config::UNITS_PER_SET)? {
            Ok(value)
        } else {
            Self::get_int_option(self.get_ticksched_config()?, ticksched_config::UNITS_PER_SET)
        }
    }

    /// Reads the multithread threshold, environment variable first, then the configuration file.
    pub fn multithread_threshold(&self) -> Result<usize, Fail> {
        if let Some(value) = Self::get_typed_env_option(ticksched_config::MULTITHREAD_THRESHOLD)? {
            Ok(value)
        } else {
            Self::get_int_option(self.get_ticksched_config()?, ticksched_config::MULTITHREAD_THRESHOLD)
        }
    }

    /// Reads the initial policy, environment variable first, then the configuration file.
    pub fn policy(&self) -> Result<Policy, Fail> {
        if let Some(policy) = Self::get_typed_env_option(ticksched_config::POLICY)? {
            Ok(policy)
        } else {
            Self::get_typed_str_option(
                self.get_ticksched_config()?,
                ticksched_config::POLICY,
                |val: &str| val.parse().ok(),
            )
        }
    }

    /// Gathers and validates every parameter.
    pub fn params(&self) -> Result<ConfigParams, Fail> {
        let params: ConfigParams = ConfigParams {
            units_per_set: self.units_per_set()?,
            multithread_threshold: self.multithread_threshold()?,
            policy: self.policy()?,
        };
        params.validate()?;
        Ok(params)
    }

    //==================================================================================================================
    // Static Functions
    //==================================================================================================================

    /// Index `yaml` to find the value at `index`, validating that it is a subsection.
    fn get_subsection<'a>(yaml: &'a Yaml, index: &str) -> Result<&'a Yaml, Fail> {
        let section: &'a Yaml = Self::get_option(yaml, index)?;
        match section {
            Yaml::Hash(_) => Ok(section),
            _ => {
                let message: String = format!("parameter \"{}\" has unexpected type", index);
                Err(Fail::new(libc::EINVAL, message.as_str()))
            },
        }
    }

    /// Index `yaml` to find the value at `index`, validating that the index exists.
    fn get_option<'a>(yaml: &'a Yaml, index: &str) -> Result<&'a Yaml, Fail> {
        match yaml.index(index) {
            Yaml::BadValue => {
                let message: String = format!("missing configuration option \"{}\"", index);
                Err(Fail::new(libc::EINVAL, message.as_str()))
            },
            value => Ok(value),
        }
    }

    /// Index `yaml` to find the value at `index`, validating that it exists and that the receiver
    /// returns Some(_).
    fn get_typed_option<'a, T, Fn>(yaml: &'a Yaml, index: &str, receiver: Fn) -> Result<T, Fail>
    where
        Fn: FnOnce(&'a Yaml) -> Option<T>,
    {
        let option: &'a Yaml = Self::get_option(yaml, index)?;
        match receiver(option) {
            Some(value) => Ok(value),
            None => {
                let message: String = format!("parameter {} has unexpected type", index);
                Err(Fail::new(libc::EINVAL, message.as_str()))
            },
        }
    }

    /// Index `yaml` to find value at `index`, validating it as a string.
    fn get_typed_str_option<T, Fn>(yaml: &Yaml, index: &str, parser: Fn) -> Result<T, Fail>
    where
        Fn: FnOnce(&str) -> Option<T>,
    {
        let option: &Yaml = Self::get_option(yaml, index)?;
        if let Some(value) = option.as_str() {
            if let Some(value) = parser(value) {
                return Ok(value);
            }
        }
        let message: String = format!("parameter {} has unexpected type", index);
        Err(Fail::new(libc::EINVAL, message.as_str()))
    }

    /// Get value where the environment value overrides the config file if it exists.
    fn get_typed_env_option<T: FromStr>(index: &str) -> Result<Option<T>, Fail> {
        if let Ok(var) = ::std::env::var(index.to_uppercase()) {
            if let Ok(value) = var.as_str().parse() {
                return Ok(Some(value));
            } else {
                let message: String = format!("parameter {} has unexpected type", index);
                return Err(Fail::new(libc::EINVAL, message.as_str()));
            }
        }
        Ok(None)
    }

    /// Similar to `get_typed_option` using `Yaml::as_i64` as the receiver, but additionally
    /// verifies that the destination type may hold the i64 value.
    fn get_int_option<T: TryFrom<i64>>(yaml: &Yaml, index: &str) -> Result<T, Fail> {
        let val: i64 = Self::get_typed_option(yaml, index, &Yaml::as_i64)?;
        match T::try_from(val) {
            Ok(val) => Ok(val),
            _ => {
                let message: String = format!("parameter \"{}\" is out of range", index);
                Err(Fail::new(libc::ERANGE, message.as_str()))
            },
        }
    }
}

/// Associated functions for validated configuration parameters.
impl ConfigParams {
    /// Rejects configurations the subsystem cannot run with, before any tick is accepted.
    pub fn validate(&self) -> Result<(), Fail> {
        if self.units_per_set == 0 {
            let cause: String = format!("invalid accounting-set size: {}", self.units_per_set);
            error!("validate(): {}", cause);
            return Err(Fail::new(libc::EINVAL, &cause));
        }
        if self.units_per_set > limits::MAX_UNITS {
            let cause: String = format!("accounting-set size is out of range: {}", self.units_per_set);
            error!("validate(): {}", cause);
            return Err(Fail::new(libc::ERANGE, &cause));
        }
        if self.multithread_threshold == 0 {
            let cause: String = format!("invalid multithread threshold: {}", self.multithread_threshold);
            error!("validate(): {}", cause);
            return Err(Fail::new(libc::EINVAL, &cause));
        }
        Ok(())
    }
}

//======================================================================================================================
// Trait Implementations
//======================================================================================================================

impl Default for ConfigParams {
    fn default() -> Self {
        Self {
            units_per_set: 64,
            multithread_threshold: 64,
            policy: Policy::Performance,
        }
    }
}

impl FromStr for Policy {
    type Err = Fail;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "performance" => Ok(Policy::Performance),
            "power" => Ok(Policy::Power),
            _ => {
                let cause: String = format!("unknown policy: {:?}", s);
                Err(Fail::new(libc::EINVAL, &cause))
            },
        }
    }
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================
