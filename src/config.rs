//! INI configuration store.
//!
//! The store lives in the supervisor; workers never read it directly. They
//! issue config requests over their message channel during `setup()` (see
//! [`crate::runtime::AppLink`]) and cache the answers. Options missing from
//! the file resolve to `None`, and the requesting side substitutes its
//! default — so a completely absent file is valid.

use configparser::ini::Ini;

use crate::{Error, Result};

/// The fallback section, consulted when an option is missing from the
/// requested section.
pub const DEFAULT_SECTION: &str = "default";

/// Declared type of a requested option.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigKind {
    Int,
    Float,
    Bool,
    Str,
}

/// A typed configuration value.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigValue {
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
}

/// INI-backed option store with a `DEFAULT` fallback namespace.
pub struct ConfigStore {
    ini: Ini,
}

impl ConfigStore {
    /// Creates an empty store
    pub fn new() -> Self {
        Self { ini: Ini::new() }
    }
    /// Loads options from an INI file, merging over the current contents
    pub fn load(&mut self, path: &str) -> Result<()> {
        self.ini.load(path).map_err(Error::Config)?;
        Ok(())
    }
    /// Loads options from an INI string (used by tests)
    pub fn read(&mut self, content: &str) -> Result<()> {
        self.ini.read(content.to_owned()).map_err(Error::Config)?;
        Ok(())
    }
    /// Sets a single option, e.g. a CLI override
    pub fn set(&mut self, section: &str, option: &str, value: &str) {
        self.ini.set(section, option, Some(value.to_owned()));
    }
    /// Looks an option up with the declared type. Returns `Ok(None)` when
    /// the option exists in neither the section nor the `DEFAULT` fallback;
    /// a present but unparsable value is an error.
    pub fn lookup(
        &self,
        section: &str,
        option: &str,
        kind: ConfigKind,
    ) -> Result<Option<ConfigValue>> {
        let section = if self.ini.get(section, option).is_some() {
            section
        } else if self.ini.get(DEFAULT_SECTION, option).is_some() {
            DEFAULT_SECTION
        } else {
            return Ok(None);
        };
        let value = match kind {
            ConfigKind::Int => self
                .ini
                .getint(section, option)
                .map_err(Error::Config)?
                .map(ConfigValue::Int),
            ConfigKind::Float => self
                .ini
                .getfloat(section, option)
                .map_err(Error::Config)?
                .map(ConfigValue::Float),
            ConfigKind::Bool => self
                .ini
                .getboolcoerce(section, option)
                .map_err(Error::Config)?
                .map(ConfigValue::Bool),
            ConfigKind::Str => self.ini.get(section, option).map(ConfigValue::Str),
        };
        Ok(value)
    }
}

impl Default for ConfigStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> ConfigStore {
        let mut s = ConfigStore::new();
        s.read(
            "[DEFAULT]\n\
             debug = true\n\
             stage_diameter = 4.5\n\
             [motor]\n\
             address = 1\n\
             max_frequency = 40\n\
             [input]\n\
             ip = 0.0.0.0\n",
        )
        .unwrap();
        s
    }

    #[test]
    fn typed_lookups() {
        let s = store();
        assert_eq!(
            s.lookup("motor", "address", ConfigKind::Int).unwrap(),
            Some(ConfigValue::Int(1))
        );
        assert_eq!(
            s.lookup("motor", "max_frequency", ConfigKind::Float).unwrap(),
            Some(ConfigValue::Float(40.0))
        );
        assert_eq!(
            s.lookup("input", "ip", ConfigKind::Str).unwrap(),
            Some(ConfigValue::Str("0.0.0.0".to_owned()))
        );
    }

    #[test]
    fn default_section_is_a_fallback() {
        let s = store();
        // not in [motor], falls back to DEFAULT
        assert_eq!(
            s.lookup("motor", "stage_diameter", ConfigKind::Float).unwrap(),
            Some(ConfigValue::Float(4.5))
        );
        assert_eq!(
            s.lookup("default", "debug", ConfigKind::Bool).unwrap(),
            Some(ConfigValue::Bool(true))
        );
    }

    #[test]
    fn missing_options_resolve_to_none() {
        let s = store();
        assert_eq!(s.lookup("motor", "port", ConfigKind::Str).unwrap(), None);
        assert_eq!(s.lookup("nosuch", "option", ConfigKind::Int).unwrap(), None);
    }

    #[test]
    fn cli_overrides_win() {
        let mut s = store();
        s.set("default", "testing", "true");
        assert_eq!(
            s.lookup("default", "testing", ConfigKind::Bool).unwrap(),
            Some(ConfigValue::Bool(true))
        );
    }
}
