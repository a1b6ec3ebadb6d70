//! Configuration layering
// (c) 2024 Ross Younger

use figment::{
    Figment, Metadata, Provider,
    providers::{Env, Serialized},
};
use tracing::trace;

use super::Configuration;

/// Environment variables we read, as set by the interop runner
pub const ENVIRONMENT_KEYS: [&str; 2] = ["TESTCASE", "QLOGDIR"];

/// A [`figment::Provider`] that holds the hard-wired defaults
struct SystemDefault {}

impl Provider for SystemDefault {
    fn metadata(&self) -> Metadata {
        Metadata::named("default")
    }

    fn data(
        &self,
    ) -> std::result::Result<
        figment::value::Map<figment::Profile, figment::value::Dict>,
        figment::Error,
    > {
        Serialized::defaults(Configuration::system_default()).data()
    }
}

/// Processes and merges all configuration sources.
///
/// In increasing order of priority:
/// 1. hard-wired defaults ([`Configuration::system_default`])
/// 2. the environment (`TESTCASE`, `QLOGDIR`)
/// 3. anything merged later with [`merge_provider`](Self::merge_provider), usually the command line
#[derive(Debug)]
pub struct Manager {
    data: Figment,
}

impl Manager {
    /// Constructor
    #[must_use]
    pub fn new(apply_env: bool) -> Self {
        let mut data = Figment::new().join(SystemDefault {});
        if apply_env {
            data = data.merge(Env::raw().only(&ENVIRONMENT_KEYS));
        }
        Self { data }
    }

    /// General constructor for production use
    #[must_use]
    pub fn standard() -> Self {
        Self::new(true)
    }

    /// Merges in a data set, which is some sort of [`figment::Provider`].
    /// This uses figment's `merge` operation, which replaces existing items.
    pub fn merge_provider<T>(&mut self, provider: T)
    where
        T: Provider,
    {
        let f = std::mem::take(&mut self.data);
        self.data = f.merge(provider);
    }

    /// Extracts the resolved configuration
    pub fn get(&self) -> Result<Configuration, figment::Error> {
        let config: Configuration = self.data.extract_lossy()?;
        trace!("resolved configuration: {config:?}");
        Ok(config)
    }
}

#[cfg(test)]
mod test {
    use figment::providers::Serialized;
    use pretty_assertions::assert_eq;

    use super::Manager;
    use crate::config::{Configuration, ConfigurationOverrides};

    #[test]
    fn defaults_only() {
        let mgr = Manager::new(false);
        assert_eq!(mgr.get().unwrap(), Configuration::system_default());
    }

    #[test]
    fn environment_layer() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("TESTCASE", "handshake");
            jail.set_env("QLOGDIR", "/logs/qlog");
            jail.set_env("WWW", "/should/not/apply");
            let config = Manager::standard().get()?;
            assert_eq!(config.testcase, "handshake");
            assert_eq!(config.qlogdir, "/logs/qlog");
            assert_eq!(config.www, std::path::PathBuf::from("/www"));
            Ok(())
        });
    }

    #[test]
    fn overrides_beat_environment() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("TESTCASE", "handshake");
            let mut mgr = Manager::standard();
            mgr.merge_provider(Serialized::defaults(ConfigurationOverrides {
                testcase: Some("transfer".into()),
                dial_timeout: Some(9),
                generate_cert: true,
                ..Default::default()
            }));
            let config = mgr.get()?;
            assert_eq!(config.testcase, "transfer");
            assert_eq!(config.dial_timeout, 9);
            assert!(config.generate_cert);
            // untouched
            assert!(config.keylog);
            assert!(!config.debug);
            Ok(())
        });
    }

    #[test]
    fn unset_overrides_leave_lower_layers_alone() {
        let mut mgr = Manager::new(false);
        mgr.merge_provider(Serialized::defaults(ConfigurationOverrides::default()));
        assert_eq!(mgr.get().unwrap(), Configuration::system_default());
    }

    #[test]
    fn listen_address_override() {
        let mut mgr = Manager::new(false);
        mgr.merge_provider(Serialized::defaults(ConfigurationOverrides {
            listen: Some("127.0.0.1:4433".parse().unwrap()),
            ..Default::default()
        }));
        assert_eq!(mgr.get().unwrap().listen.port(), 4433);
    }
}
