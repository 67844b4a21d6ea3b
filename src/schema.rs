//! Bundled application schema
//!
//! Schema changelog:
//! v1: flat `stats` (`gitSurvivorHighScore`, ...)
//! v2: adds `achievements: []`
//! v3: per-game `stats.gitSurvivor` and shared `stats.global`

use serde_json::{Map, Value, json};

use crate::persistence::{
    MigrationEngine, MigrationError, MigrationRegistry, StepError, shallow_merge, stamp_version,
};
use crate::settings::StoreSettings;
use crate::store::path;

/// Schema version written by this build
pub const CURRENT_VERSION: u32 = 3;

/// Top-level fields every current tree must carry
pub const REQUIRED_FIELDS: &[&str] = &["stats", "achievements"];

/// v2 flat stat keys and where they live from v3 on
const STAT_MOVES: &[(&str, &str)] = &[
    ("gitSurvivorHighScore", "gitSurvivor.highScore"),
    ("gitSurvivorGamesPlayed", "gitSurvivor.gamesPlayed"),
    ("gitSurvivorBestWave", "gitSurvivor.bestWave"),
    ("totalPlayTime", "global.totalPlayTime"),
    ("sessions", "global.sessions"),
];

/// Factory-default tree at `CURRENT_VERSION`
pub fn default_data() -> Value {
    json!({
        "version": CURRENT_VERSION,
        "stats": {
            "gitSurvivor": {
                "highScore": 0,
                "gamesPlayed": 0,
                "bestWave": 0
            },
            "global": {
                "totalPlayTime": 0,
                "sessions": 0
            }
        },
        "achievements": [],
        "settings": {
            "soundEnabled": true,
            "volume": 0.8
        }
    })
}

/// Every migration from v1 up to `CURRENT_VERSION`
pub fn registry() -> Result<MigrationRegistry, MigrationError> {
    let mut registry = MigrationRegistry::new();
    registry.register(1, "add achievements list", add_achievements)?;
    registry.register(2, "nest stats per game", nest_stats)?;
    Ok(registry)
}

/// Engine for this schema, using the backup slot named in `settings`.
/// Rejects settings whose backup slot would overwrite the data or settings.
pub fn engine(settings: &StoreSettings) -> Result<MigrationEngine, MigrationError> {
    settings.check_keys(&settings.backup_key)?;
    Ok(MigrationEngine::new(registry()?, CURRENT_VERSION, default_data)
        .with_required_fields(REQUIRED_FIELDS.iter().copied())
        .with_backup_key(settings.backup_key.clone()))
}

/// v1 → v2
fn add_achievements(tree: Value) -> Result<Value, StepError> {
    let achievements = match tree.get("achievements") {
        Some(existing @ Value::Array(_)) => existing.clone(),
        _ => Value::Array(Vec::new()),
    };
    Ok(shallow_merge(
        tree,
        json!({"version": 2, "achievements": achievements}),
    ))
}

/// v2 → v3
fn nest_stats(mut tree: Value) -> Result<Value, StepError> {
    let old = match tree.get_mut("stats").map(Value::take) {
        None | Some(Value::Null) => Map::new(),
        Some(Value::Object(map)) => map,
        Some(other) => {
            return Err(StepError::new(format!(
                "stats is a {}, expected a mapping",
                path::ValueKind::of(&other)
            )));
        }
    };

    let mut defaults = default_data();
    let mut stats = defaults["stats"].take();
    let mut unknown = Map::new();
    for (key, value) in old {
        match STAT_MOVES.iter().find(|(from, _)| *from == key) {
            Some((_, to)) => {
                path::set(&mut stats, to, value)?;
            }
            None => {
                unknown.insert(key, value);
            }
        }
    }
    // Unrecognised flat stats ride along at the top of `stats`
    let stats = shallow_merge(Value::Object(unknown), stats);

    let mut tree = shallow_merge(tree, json!({"stats": stats}));
    stamp_version(&mut tree, 3);
    Ok(tree)
}
