use std::path::Path;

use serde::Deserialize;
use world::WorldConfig;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NetSection {
    pub listen_addr: String,
}

impl Default for NetSection {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8081".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TickSection {
    pub tps: u32,
}

impl Default for TickSection {
    fn default() -> Self {
        Self { tps: 10 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseSection {
    pub path: String,
}

impl Default for DatabaseSection {
    fn default() -> Self {
        Self {
            path: "data/world.db".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GameSection {
    pub motd: String,
    pub map_dir: String,
    pub spawn_room_id: i64,
    pub spawn_y: i32,
    pub spawn_x: i32,
    pub weather_interval_secs: u64,
    pub save_interval_secs: u64,
    pub despawn_secs: u64,
    pub gather_interval_secs: u64,
    pub gather_chance: f64,
    pub inbound_queue_cap: usize,
}

impl Default for GameSection {
    fn default() -> Self {
        let base = WorldConfig::default();
        Self {
            motd: base.motd,
            map_dir: base.map_dir,
            spawn_room_id: base.spawn_room_id,
            spawn_y: base.spawn_pos.0,
            spawn_x: base.spawn_pos.1,
            weather_interval_secs: base.weather_interval_secs,
            save_interval_secs: base.save_interval_secs,
            despawn_secs: base.despawn_secs,
            gather_interval_secs: base.gather_interval_secs,
            gather_chance: base.gather_chance,
            inbound_queue_cap: base.inbound_queue_cap,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CryptoSection {
    pub rsa_bits: usize,
}

impl Default for CryptoSection {
    fn default() -> Self {
        Self { rsa_bits: 2048 }
    }
}

/// Top-level server configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub net: NetSection,
    pub tick: TickSection,
    pub database: DatabaseSection,
    pub game: GameSection,
    pub crypto: CryptoSection,
}

impl ServerConfig {
    /// Load configuration from an optional TOML file path.
    pub fn load(config_path: Option<&str>) -> Result<Self, Box<dyn std::error::Error>> {
        let config = match config_path {
            Some(path) if Path::new(path).exists() => {
                let content = std::fs::read_to_string(path)?;
                toml::from_str(&content)?
            }
            _ => Self::default(),
        };
        Ok(config)
    }

    pub fn to_world_config(&self) -> WorldConfig {
        WorldConfig {
            tick_rate: self.tick.tps.max(1),
            motd: self.game.motd.clone(),
            spawn_room_id: self.game.spawn_room_id,
            spawn_pos: (self.game.spawn_y, self.game.spawn_x),
            map_dir: self.game.map_dir.clone(),
            weather_interval_secs: self.game.weather_interval_secs,
            save_interval_secs: self.game.save_interval_secs,
            despawn_secs: self.game.despawn_secs,
            gather_interval_secs: self.game.gather_interval_secs,
            gather_chance: self.game.gather_chance,
            inbound_queue_cap: self.game.inbound_queue_cap,
            rsa_bits: self.crypto.rsa_bits,
            rng_seed: None,
        }
    }
}

/// Parse CLI arguments and load config. Supports: --config <path>
pub fn parse_cli_args() -> ServerConfig {
    let args: Vec<String> = std::env::args().collect();
    let mut config_path: Option<&str> = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" => {
                if let Some(val) = args.get(i + 1) {
                    config_path = Some(val.as_str());
                    i += 2;
                } else {
                    eprintln!("--config requires a path argument");
                    std::process::exit(1);
                }
            }
            other => {
                eprintln!("Unknown argument: {}", other);
                std::process::exit(1);
            }
        }
    }

    match ServerConfig::load(config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load config: {}", e);
            std::process::exit(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn defaults_match_hardcoded_values() {
        let config = ServerConfig::default();
        assert_eq!(config.net.listen_addr, "0.0.0.0:8081");
        assert_eq!(config.tick.tps, 10);
        assert_eq!(config.database.path, "data/world.db");
        assert_eq!(config.game.spawn_room_id, 1);
        assert_eq!(config.game.despawn_secs, 60);
        assert_eq!(config.crypto.rsa_bits, 2048);
    }

    #[test]
    fn to_world_config_mirrors_sections() {
        let config = ServerConfig::default();
        let wc = config.to_world_config();
        assert_eq!(wc.tick_rate, 10);
        assert_eq!(wc.spawn_pos, (5, 5));
        assert_eq!(wc.rsa_bits, 2048);
        assert!(wc.rng_seed.is_none());
    }

    #[test]
    fn zero_tps_clamps_to_one() {
        let mut config = ServerConfig::default();
        config.tick.tps = 0;
        assert_eq!(config.to_world_config().tick_rate, 1);
    }

    #[test]
    fn load_nonexistent_file_returns_defaults() {
        let config = ServerConfig::load(Some("/tmp/no_such_config_8081.toml")).unwrap();
        assert_eq!(config.tick.tps, 10);
    }

    #[test]
    fn load_partial_toml_keeps_other_defaults() {
        let mut f = NamedTempFile::new().unwrap();
        write!(
            f,
            r#"
[tick]
tps = 20

[game]
motd = "hi there"
"#
        )
        .unwrap();

        let config = ServerConfig::load(Some(f.path().to_str().unwrap())).unwrap();
        assert_eq!(config.tick.tps, 20);
        assert_eq!(config.game.motd, "hi there");
        assert_eq!(config.net.listen_addr, "0.0.0.0:8081");
    }

    #[test]
    fn load_rejects_malformed_toml() {
        let mut f = NamedTempFile::new().unwrap();
        write!(f, "this is not toml [").unwrap();
        assert!(ServerConfig::load(Some(f.path().to_str().unwrap())).is_err());
    }
}
