use config::{Config, ConfigError};
use serde::Deserialize;

pub mod domain;
pub mod infrastructure;

#[derive(Clone, Debug, Deserialize)]
pub struct KokyakuConfig {
    pub server: Server,
    pub store: Store,
    pub logger: Logger,
}

impl KokyakuConfig {
    pub fn load() -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(config::File::with_name("kokyaku.toml"))
            .add_source(
                config::Environment::with_prefix("KOKYAKU")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?
            .try_deserialize::<KokyakuConfig>()
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct Server {
    pub address: String,
    /// `Location` ヘッダに使うホスト名 (リクエストに Host が無い場合)
    pub public_host: String,
    pub tls: Option<Tls>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Tls {
    pub cert: String,
    pub key: String,
}

/// 顧客ドキュメントの保存先
#[derive(Clone, Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Store {
    Memory,
    Mongodb { url: String, database: String },
}

#[derive(Clone, Debug, Deserialize)]
pub struct Logger {
    pub level: Level,
}

#[derive(Clone, Debug, Deserialize)]
pub enum Level {
    TRACE,
    DEBUG,
    INFO,
    WARN,
    ERROR,
}

impl From<&Level> for tracing::Level {
    fn from(value: &Level) -> Self {
        match value {
            Level::TRACE => tracing::Level::TRACE,
            Level::DEBUG => tracing::Level::DEBUG,
            Level::INFO => tracing::Level::INFO,
            Level::WARN => tracing::Level::WARN,
            Level::ERROR => tracing::Level::ERROR,
        }
    }
}

#[cfg(test)]
mod tests {
    use config::{Config, File, FileFormat};

    use super::*;

    fn parse(toml: &str) -> KokyakuConfig {
        Config::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    #[test]
    fn test_memory_store_config() {
        let config = parse(
            r#"
            [server]
            address = "127.0.0.1:8080"
            public_host = "localhost:8080"

            [store]
            kind = "memory"

            [logger]
            level = "DEBUG"
            "#,
        );
        assert_eq!(config.server.address, "127.0.0.1:8080");
        assert!(config.server.tls.is_none());
        assert!(matches!(config.store, Store::Memory));
        assert_eq!(
            tracing::Level::from(&config.logger.level),
            tracing::Level::DEBUG
        );
    }

    #[test]
    fn test_mongodb_store_config() {
        let config = parse(
            r#"
            [server]
            address = "0.0.0.0:443"
            public_host = "kokyaku.example.com"
            tls = { cert = "localhost.pem", key = "localhost.key" }

            [store]
            kind = "mongodb"
            url = "mongodb://localhost:27017/?replicaSet=rs0"
            database = "kokyaku"

            [logger]
            level = "WARN"
            "#,
        );
        let tls = config.server.tls.unwrap();
        assert_eq!(tls.cert, "localhost.pem");
        assert_eq!(tls.key, "localhost.key");
        match config.store {
            Store::Mongodb { url, database } => {
                assert_eq!(url, "mongodb://localhost:27017/?replicaSet=rs0");
                assert_eq!(database, "kokyaku");
            }
            Store::Memory => panic!("mongodb store expected"),
        }
    }
}
