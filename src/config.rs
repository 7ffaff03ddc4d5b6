use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::Deserialize;

use crate::qualifier::Hierarchies;

/// Platform version whose built-in overlay is loaded when none is configured.
pub(crate) const DEFAULT_PLATFORM_VERSION: u32 = 17;

/// Everything that shapes one engine run.
#[derive(Clone, Debug)]
pub(crate) struct EngineOptions {
    pub(crate) platform_version: u32,
    /// Skip every platform overlay, built-in or on disk.
    pub(crate) ignore_platform: bool,
    /// Directory or archive holding one overlay per platform class.
    pub(crate) platform_overlays: Option<PathBuf>,
    pub(crate) allow_missing_platform: bool,
    /// Parse the whole platform tree at startup instead of per class on demand.
    pub(crate) parse_all_platform: bool,
    /// Let qualifiers of the real program win over user and platform overlays.
    pub(crate) merge_with_source: bool,
    pub(crate) warn_if_not_found: bool,
    /// Print diagnostics of platform overlays too.
    pub(crate) debug_overlays: bool,
    pub(crate) user_overlays: Vec<PathBuf>,
    pub(crate) shadow_overlays: Vec<PathBuf>,
    pub(crate) hierarchies: BTreeMap<String, Vec<String>>,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            platform_version: DEFAULT_PLATFORM_VERSION,
            ignore_platform: false,
            platform_overlays: None,
            allow_missing_platform: false,
            parse_all_platform: false,
            merge_with_source: false,
            warn_if_not_found: false,
            debug_overlays: false,
            user_overlays: Vec::new(),
            shadow_overlays: Vec::new(),
            hierarchies: Hierarchies::builtin(),
        }
    }
}

impl EngineOptions {
    /// Fill in settings the configuration file provides. Flags already set stay set
    /// and overlay lists from the file come before those given on the command line.
    pub(crate) fn apply_config(&mut self, config: ConfigFile) {
        for (hierarchy, qualifiers) in config.hierarchies {
            self.hierarchies
                .entry(hierarchy)
                .or_default()
                .extend(qualifiers);
        }
        if let Some(version) = config.platform_version {
            self.platform_version = version;
        }
        if self.platform_overlays.is_none() {
            self.platform_overlays = config.platform_overlays;
        }
        self.ignore_platform |= config.ignore_platform;
        self.allow_missing_platform |= config.allow_missing_platform;
        self.parse_all_platform |= config.parse_all_platform;
        self.merge_with_source |= config.merge_with_source;
        self.warn_if_not_found |= config.warn_if_not_found;
        self.debug_overlays |= config.debug_overlays;
        let mut user_overlays = config.stubs;
        user_overlays.append(&mut self.user_overlays);
        self.user_overlays = user_overlays;
        let mut shadow_overlays = config.shadow;
        shadow_overlays.append(&mut self.shadow_overlays);
        self.shadow_overlays = shadow_overlays;
    }

    pub(crate) fn hierarchies(&self) -> Hierarchies {
        Hierarchies::new(&self.hierarchies)
    }
}

/// JSON configuration file.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "kebab-case")]
pub(crate) struct ConfigFile {
    /// Hierarchy name to fully qualified qualifier names.
    pub(crate) hierarchies: BTreeMap<String, Vec<String>>,
    pub(crate) platform_version: Option<u32>,
    pub(crate) platform_overlays: Option<PathBuf>,
    pub(crate) ignore_platform: bool,
    pub(crate) allow_missing_platform: bool,
    pub(crate) parse_all_platform: bool,
    pub(crate) merge_with_source: bool,
    pub(crate) warn_if_not_found: bool,
    pub(crate) debug_overlays: bool,
    pub(crate) stubs: Vec<PathBuf>,
    pub(crate) shadow: Vec<PathBuf>,
}

pub(crate) fn load_config(path: &Path) -> Result<ConfigFile> {
    let text =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    let mut config = parse_config(&text)
        .with_context(|| format!("invalid configuration file {}", path.display()))?;
    // Relative paths in the file are relative to the file.
    let base = path.parent().unwrap_or_else(|| Path::new(""));
    let resolve = |entry: PathBuf| {
        if entry.is_absolute() {
            entry
        } else {
            base.join(entry)
        }
    };
    config.platform_overlays = config.platform_overlays.map(resolve);
    config.stubs = config.stubs.into_iter().map(resolve).collect();
    config.shadow = config.shadow.into_iter().map(resolve).collect();
    Ok(config)
}

fn parse_config(text: &str) -> Result<ConfigFile> {
    let deserializer = &mut serde_json::Deserializer::from_str(text);
    serde_path_to_error::deserialize(deserializer).map_err(|err| {
        let path = err.path().to_string();
        anyhow!("{} (at {path})", err.into_inner())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_hierarchies_and_flags() {
        let config = parse_config(
            r#"{
                "hierarchies": { "taint": ["q.Tainted", "q.Untainted"] },
                "platform-version": 21,
                "merge-with-source": true,
                "stubs": ["extra.astub"]
            }"#,
        )
        .expect("config");

        assert_eq!(config.hierarchies["taint"], vec!["q.Tainted", "q.Untainted"]);
        assert_eq!(config.platform_version, Some(21));
        assert!(config.merge_with_source);
        assert!(!config.ignore_platform);
        assert_eq!(config.stubs, vec![PathBuf::from("extra.astub")]);
    }

    #[test]
    fn errors_name_the_offending_path() {
        let err = parse_config(r#"{ "hierarchies": { "taint": [1] } }"#).expect_err("invalid");
        let message = format!("{err:#}");
        assert!(message.contains("hierarchies.taint[0]"), "{message}");

        let err = parse_config(r#"{ "unknown": true }"#).expect_err("unknown field");
        assert!(format!("{err:#}").contains("unknown field"));
    }

    #[test]
    fn config_fills_options_without_dropping_command_line_values() {
        let mut options = EngineOptions {
            user_overlays: vec![PathBuf::from("cli.astub")],
            warn_if_not_found: true,
            ..EngineOptions::default()
        };
        let config = ConfigFile {
            hierarchies: BTreeMap::from([(
                "nullness".to_string(),
                vec!["q.MaybeNull".to_string()],
            )]),
            stubs: vec![PathBuf::from("config.astub")],
            platform_version: Some(11),
            ..ConfigFile::default()
        };

        options.apply_config(config);

        assert_eq!(
            options.user_overlays,
            vec![PathBuf::from("config.astub"), PathBuf::from("cli.astub")]
        );
        assert!(options.warn_if_not_found);
        assert_eq!(options.platform_version, 11);
        assert_eq!(
            options.hierarchies().hierarchy_of("q.MaybeNull"),
            Some("nullness")
        );
        assert_eq!(
            options.hierarchies().hierarchy_of("stubweave.qual.Nullable"),
            Some("nullness")
        );
    }

    #[test]
    fn relative_paths_resolve_against_the_file() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("stubweave.json");
        fs::write(&path, r#"{ "stubs": ["overlays/a.astub"] }"#).expect("write config");

        let config = load_config(&path).expect("config");

        assert_eq!(config.stubs, vec![dir.path().join("overlays/a.astub")]);
    }
}
