//! # Resource Templates
//!
//! Immutable, shared templates referenced by id from many entities. Loaded
//! once before the first frame and handed to the world behind an `Arc`; no
//! system ever writes them.
//!
//! ```toml
//! [[missile]]
//! id = 1
//! half_extent = 0.25
//! mass = 40.0
//! friction = 2.0
//! mesh_id = 7
//! explosion_id = 3
//! lifetime = 10.0
//!
//! [[bullet]]
//! id = 1
//! speed = 400.0
//! range = 800.0
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use atlas_core::{Missing, SimError, SimResult};
use serde::Deserialize;

/// Ballistic and visual parameters of a missile.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MissileResource {
    /// Template id.
    pub id: u32,
    /// Half the missile's box size.
    pub half_extent: f32,
    /// Mass in kilograms. Must be positive.
    pub mass: f32,
    /// Linear drag coefficient.
    pub friction: f32,
    /// Visual mesh reference, opaque to the simulation.
    pub mesh_id: u32,
    /// Explosion effect reference carried by impact events.
    pub explosion_id: u32,
    /// Seconds before the missile despawns on its own.
    pub lifetime: f32,
}

fn positive(value: f32) -> bool {
    value > 0.0 && value.is_finite()
}

fn default_bullet_range() -> f32 {
    1_000.0
}

/// Parameters of a straight-flying bullet.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BulletResource {
    /// Template id.
    pub id: u32,
    /// World units per second.
    pub speed: f32,
    /// Distance before the bullet despawns.
    #[serde(default = "default_bullet_range")]
    pub range: f32,
    /// Half the bullet's box size; zero for a point.
    #[serde(default)]
    pub half_extent: f32,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct ResourceFile {
    #[serde(default)]
    missile: Vec<MissileResource>,
    #[serde(default)]
    bullet: Vec<BulletResource>,
}

/// Every template of a simulation, keyed by id.
#[derive(Clone, Debug, Default)]
pub struct ResourceTable {
    missiles: BTreeMap<u32, MissileResource>,
    bullets: BTreeMap<u32, BulletResource>,
}

impl ResourceTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a TOML document.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` for malformed TOML, duplicate ids, or non-physical
    /// parameters.
    pub fn from_toml_str(text: &str) -> SimResult<Self> {
        let file: ResourceFile = toml::from_str(text)
            .map_err(|e| SimError::InvalidConfig(format!("resource file: {e}")))?;
        let mut table = Self::new();
        for missile in file.missile {
            table.insert_missile(missile)?;
        }
        for bullet in file.bullet {
            table.insert_bullet(bullet)?;
        }
        Ok(table)
    }

    /// Reads and parses a resource file.
    ///
    /// # Errors
    ///
    /// `IoFailure` if the file cannot be read, otherwise as `from_toml_str`.
    pub fn load(path: impl AsRef<Path>) -> SimResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| SimError::IoFailure(format!("{}: {e}", path.display())))?;
        let table = Self::from_toml_str(&text)?;
        tracing::info!(
            path = %path.display(),
            missiles = table.missiles.len(),
            bullets = table.bullets.len(),
            "loaded resource templates"
        );
        Ok(table)
    }

    /// Adds a missile template.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` for a duplicate id, a non-positive mass or lifetime,
    /// or a negative size or friction.
    pub fn insert_missile(&mut self, missile: MissileResource) -> SimResult<()> {
        if !positive(missile.mass) || !positive(missile.lifetime) {
            return Err(SimError::InvalidConfig(format!(
                "missile {}: mass and lifetime must be positive",
                missile.id
            )));
        }
        if missile.half_extent < 0.0 || missile.friction < 0.0 {
            return Err(SimError::InvalidConfig(format!(
                "missile {}: size and friction must not be negative",
                missile.id
            )));
        }
        if self.missiles.contains_key(&missile.id) {
            return Err(SimError::InvalidConfig(format!("duplicate missile id {}", missile.id)));
        }
        self.missiles.insert(missile.id, missile);
        Ok(())
    }

    /// Adds a bullet template.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` for a duplicate id or a non-positive speed.
    pub fn insert_bullet(&mut self, bullet: BulletResource) -> SimResult<()> {
        if !positive(bullet.speed) || bullet.half_extent < 0.0 {
            return Err(SimError::InvalidConfig(format!(
                "bullet {}: speed must be positive and size not negative",
                bullet.id
            )));
        }
        if self.bullets.contains_key(&bullet.id) {
            return Err(SimError::InvalidConfig(format!("duplicate bullet id {}", bullet.id)));
        }
        self.bullets.insert(bullet.id, bullet);
        Ok(())
    }

    /// Looks up a missile template.
    ///
    /// # Errors
    ///
    /// `NotFound` if no missile has this id.
    pub fn missile(&self, id: u32) -> SimResult<&MissileResource> {
        self.missiles
            .get(&id)
            .ok_or(SimError::NotFound(Missing::Resource(id)))
    }

    /// Looks up a bullet template.
    ///
    /// # Errors
    ///
    /// `NotFound` if no bullet has this id.
    pub fn bullet(&self, id: u32) -> SimResult<&BulletResource> {
        self.bullets
            .get(&id)
            .ok_or(SimError::NotFound(Missing::Resource(id)))
    }

    /// Number of templates of every kind.
    #[must_use]
    pub fn len(&self) -> usize {
        self.missiles.len() + self.bullets.len()
    }

    /// Returns true if no template is loaded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        [[missile]]
        id = 1
        half_extent = 0.25
        mass = 40.0
        friction = 2.0
        mesh_id = 7
        explosion_id = 3
        lifetime = 10.0

        [[bullet]]
        id = 1
        speed = 400.0
    "#;

    #[test]
    fn test_parse_sample() {
        let table = ResourceTable::from_toml_str(SAMPLE).unwrap();
        assert_eq!(table.len(), 2);

        let missile = table.missile(1).unwrap();
        assert_eq!(missile.explosion_id, 3);
        assert_eq!(missile.mass, 40.0);

        let bullet = table.bullet(1).unwrap();
        assert_eq!(bullet.range, 1_000.0);
        assert_eq!(bullet.half_extent, 0.0);
    }

    #[test]
    fn test_unknown_id_is_not_found() {
        let table = ResourceTable::from_toml_str(SAMPLE).unwrap();
        assert_eq!(
            table.missile(2).unwrap_err(),
            SimError::NotFound(Missing::Resource(2))
        );
        assert!(table.bullet(9).is_err());
    }

    #[test]
    fn test_rejects_duplicates_and_bad_physics() {
        let duplicate = format!("{SAMPLE}\n[[bullet]]\nid = 1\nspeed = 5.0\n");
        assert!(matches!(
            ResourceTable::from_toml_str(&duplicate),
            Err(SimError::InvalidConfig(_))
        ));

        let massless = SAMPLE.replace("mass = 40.0", "mass = 0.0");
        assert!(matches!(
            ResourceTable::from_toml_str(&massless),
            Err(SimError::InvalidConfig(_))
        ));
    }
}
