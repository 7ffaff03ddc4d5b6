use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use opentelemetry::KeyValue;
use rayon::prelude::*;
use tracing::debug;
use zip::ZipArchive;

use crate::classfile::{ClassFile, parse_class_bytes};
use crate::telemetry::{Phase, Telemetry, with_span};

/// File extension of overlay files.
pub(crate) const OVERLAY_EXTENSION: &str = "astub";

const PACKAGE_INFO: &str = "package-info";

/// Classes read from the class path.
#[derive(Debug)]
pub(crate) struct ScanOutput {
    pub(crate) classes: Vec<ClassFile>,
    /// Class path entries after manifest `Class-Path` expansion.
    pub(crate) entries: Vec<PathBuf>,
}

/// Raw class bytes and where they came from.
struct ClassBlob {
    origin: String,
    data: Vec<u8>,
}

pub(crate) fn scan_classpath(
    classpath: &[PathBuf],
    telemetry: Option<&Telemetry>,
) -> Result<ScanOutput> {
    let entries = expand_classpath(classpath.to_vec())?;
    let mut blobs = Vec::new();
    for entry in &entries {
        collect_class_blobs(entry, true, telemetry, &mut blobs)?;
    }

    let attributes = [KeyValue::new("stubweave.class_count", blobs.len() as i64)];
    let classes = with_span(telemetry, Phase::ClassParse, &attributes, || {
        blobs
            .par_iter()
            .map(|blob| {
                parse_class_bytes(&blob.data)
                    .with_context(|| format!("failed to parse {}", blob.origin))
            })
            .collect::<Result<Vec<_>>>()
    })?;
    debug!(
        "scanned {} classes from {} class path entries",
        classes.len(),
        entries.len()
    );

    Ok(ScanOutput { classes, entries })
}

fn collect_class_blobs(
    path: &Path,
    strict: bool,
    telemetry: Option<&Telemetry>,
    blobs: &mut Vec<ClassBlob>,
) -> Result<()> {
    if path.is_dir() {
        for entry in sorted_dir_entries(path)? {
            collect_class_blobs(&entry, false, telemetry, blobs)?;
        }
        return Ok(());
    }

    let extension = path.extension().and_then(|ext| ext.to_str()).unwrap_or("");
    match extension {
        "class" => {
            let data =
                fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
            blobs.push(ClassBlob {
                origin: path.display().to_string(),
                data,
            });
            Ok(())
        }
        "jar" => {
            let attributes = [KeyValue::new(
                "stubweave.jar_path",
                path.display().to_string(),
            )];
            with_span(telemetry, Phase::JarScan, &attributes, || {
                collect_jar_classes(path, blobs)
            })
        }
        _ => {
            if strict {
                anyhow::bail!("unsupported class path entry: {}", path.display())
            } else {
                Ok(())
            }
        }
    }
}

fn collect_jar_classes(path: &Path, blobs: &mut Vec<ClassBlob>) -> Result<()> {
    let mut archive = open_archive(path)?;
    let mut entry_names = Vec::new();
    for index in 0..archive.len() {
        let entry = archive
            .by_index(index)
            .with_context(|| format!("failed to read {}", path.display()))?;
        if entry.is_dir() {
            continue;
        }
        let name = entry.name().to_string();
        if name.ends_with(".class")
            && !name.ends_with("module-info.class")
            && !name.starts_with("META-INF/versions/")
        {
            entry_names.push(name);
        }
    }
    entry_names.sort();

    for name in entry_names {
        let data = read_archive_entry(&mut archive, path, &name)?;
        blobs.push(ClassBlob {
            origin: format!("{}:{}", path.display(), name),
            data,
        });
    }
    Ok(())
}

/// One overlay file read into memory.
#[derive(Clone, Debug)]
pub(crate) struct OverlayText {
    /// Path, or `archive:entry` for archive members.
    pub(crate) name: String,
    pub(crate) text: String,
}

/// Read every overlay under `path`: a single file, a directory walked recursively
/// in name order, or an archive whose overlay entries are taken in name order.
pub(crate) fn collect_overlays(path: &Path) -> Result<Vec<OverlayText>> {
    let mut overlays = Vec::new();
    for location in overlay_locations(path)? {
        overlays.push(OverlayText {
            name: location.to_string(),
            text: location.read()?,
        });
    }
    Ok(overlays)
}

fn overlay_locations(path: &Path) -> Result<Vec<OverlayLocation>> {
    if !path.exists() {
        anyhow::bail!("overlay location not found: {}", path.display());
    }
    if path.is_dir() {
        let mut locations = Vec::new();
        walk_overlay_dir(path, &mut locations)?;
        return Ok(locations);
    }
    if is_jar_path(path) {
        return archive_overlay_entries(path);
    }
    Ok(vec![OverlayLocation::File(path.to_path_buf())])
}

fn walk_overlay_dir(path: &Path, locations: &mut Vec<OverlayLocation>) -> Result<()> {
    for entry in sorted_dir_entries(path)? {
        if entry.is_dir() {
            walk_overlay_dir(&entry, locations)?;
        } else if is_overlay_path(&entry) {
            locations.push(OverlayLocation::File(entry));
        }
    }
    Ok(())
}

fn archive_overlay_entries(path: &Path) -> Result<Vec<OverlayLocation>> {
    let mut archive = open_archive(path)?;
    let mut names = Vec::new();
    for index in 0..archive.len() {
        let entry = archive
            .by_index(index)
            .with_context(|| format!("failed to read {}", path.display()))?;
        if !entry.is_dir() && entry.name().ends_with(&format!(".{OVERLAY_EXTENSION}")) {
            names.push(entry.name().to_string());
        }
    }
    names.sort();
    Ok(names
        .into_iter()
        .map(|entry| OverlayLocation::ArchiveEntry {
            archive: path.to_path_buf(),
            entry,
        })
        .collect())
}

/// Where an overlay lives before it is read.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum OverlayLocation {
    File(PathBuf),
    ArchiveEntry { archive: PathBuf, entry: String },
}

impl OverlayLocation {
    pub(crate) fn read(&self) -> Result<String> {
        match self {
            OverlayLocation::File(path) => fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display())),
            OverlayLocation::ArchiveEntry { archive, entry } => {
                let mut zip = open_archive(archive)?;
                let data = read_archive_entry(&mut zip, archive, entry)?;
                String::from_utf8(data)
                    .with_context(|| format!("{}:{} is not UTF-8", archive.display(), entry))
            }
        }
    }
}

impl std::fmt::Display for OverlayLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OverlayLocation::File(path) => write!(f, "{}", path.display()),
            OverlayLocation::ArchiveEntry { archive, entry } => {
                write!(f, "{}:{}", archive.display(), entry)
            }
        }
    }
}

/// Platform overlays laid out one file per top-level class, `java/lang/String.astub`
/// holding `java.lang.String`.
#[derive(Debug, Default)]
pub(crate) struct PlatformTree {
    /// Canonical name of the top-level class to its overlay.
    pub(crate) classes: BTreeMap<String, OverlayLocation>,
    pub(crate) package_infos: Vec<OverlayLocation>,
}

impl PlatformTree {
    pub(crate) fn len(&self) -> usize {
        self.classes.len() + self.package_infos.len()
    }
}

pub(crate) fn index_platform_tree(root: &Path) -> Result<PlatformTree> {
    if !root.exists() {
        anyhow::bail!("platform overlay tree not found: {}", root.display());
    }
    let mut tree = PlatformTree::default();
    if root.is_dir() {
        let mut locations = Vec::new();
        walk_overlay_dir(root, &mut locations)?;
        for location in locations {
            if let OverlayLocation::File(path) = &location {
                let relative = path.strip_prefix(root).unwrap_or(path);
                let key = relative
                    .components()
                    .map(|component| component.as_os_str().to_string_lossy().into_owned())
                    .collect::<Vec<_>>()
                    .join("/");
                tree.insert(&key, location);
            }
        }
    } else if is_jar_path(root) {
        for location in archive_overlay_entries(root)? {
            if let OverlayLocation::ArchiveEntry { entry, .. } = &location {
                let key = entry.clone();
                tree.insert(&key, location);
            }
        }
    } else {
        anyhow::bail!(
            "platform overlay tree must be a directory or a jar: {}",
            root.display()
        );
    }
    Ok(tree)
}

impl PlatformTree {
    fn insert(&mut self, relative: &str, location: OverlayLocation) {
        let Some(stem) = relative.strip_suffix(&format!(".{OVERLAY_EXTENSION}")) else {
            return;
        };
        if stem == PACKAGE_INFO || stem.ends_with(&format!("/{PACKAGE_INFO}")) {
            self.package_infos.push(location);
        } else {
            self.classes.insert(stem.replace('/', "."), location);
        }
    }
}

fn sorted_dir_entries(path: &Path) -> Result<Vec<PathBuf>> {
    let mut entries = Vec::new();
    for entry in fs::read_dir(path)
        .with_context(|| format!("failed to read directory {}", path.display()))?
    {
        let entry =
            entry.with_context(|| format!("failed to read entry under {}", path.display()))?;
        entries.push(entry.path());
    }
    entries.sort_by_key(|entry| path_key(entry));
    Ok(entries)
}

fn open_archive(path: &Path) -> Result<ZipArchive<fs::File>> {
    let file =
        fs::File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    ZipArchive::new(file).with_context(|| format!("failed to read {}", path.display()))
}

fn read_archive_entry(
    archive: &mut ZipArchive<fs::File>,
    path: &Path,
    name: &str,
) -> Result<Vec<u8>> {
    let mut entry = archive
        .by_name(name)
        .with_context(|| format!("failed to read {}:{}", path.display(), name))?;
    let mut data = Vec::new();
    entry
        .read_to_end(&mut data)
        .with_context(|| format!("failed to read {}:{}", path.display(), name))?;
    Ok(data)
}

fn path_key(path: &Path) -> String {
    path.to_string_lossy().to_string()
}

fn expand_classpath(initial: Vec<PathBuf>) -> Result<Vec<PathBuf>> {
    let mut queue = VecDeque::from(initial);
    let mut seen = BTreeSet::new();
    let mut result = Vec::new();
    while let Some(entry) = queue.pop_front() {
        if !seen.insert(path_key(&entry)) {
            continue;
        }
        if !entry.exists() {
            anyhow::bail!("classpath entry not found: {}", entry.display());
        }
        result.push(entry.clone());
        if is_jar_path(&entry) {
            let mut referenced = manifest_classpath(&entry)?;
            referenced.sort_by_key(|item| path_key(item));
            queue.extend(referenced);
        }
    }

    Ok(result)
}

fn manifest_classpath(path: &Path) -> Result<Vec<PathBuf>> {
    let mut archive = open_archive(path)?;
    let Ok(mut entry) = archive.by_name("META-INF/MANIFEST.MF") else {
        return Ok(Vec::new());
    };
    let mut content = String::new();
    entry
        .read_to_string(&mut content)
        .with_context(|| format!("failed to read manifest of {}", path.display()))?;
    Ok(parse_manifest_classpath(path, &content))
}

fn parse_manifest_classpath(jar_path: &Path, content: &str) -> Vec<PathBuf> {
    let mut class_path = None;
    let mut current_key: Option<String> = None;
    let mut current_value = String::new();

    for raw_line in content.lines() {
        let line = raw_line.trim_end_matches('\r');
        if let Some(continuation) = line.strip_prefix(' ') {
            if current_key.is_some() {
                current_value.push_str(continuation);
            }
            continue;
        }

        if let Some(key) = current_key.take() {
            if key == "Class-Path" {
                class_path = Some(current_value.clone());
            }
            current_value.clear();
        }

        if let Some((key, value)) = line.split_once(':') {
            current_key = Some(key.trim().to_string());
            current_value.push_str(value.trim_start());
        }
    }

    if let Some(key) = current_key
        && key == "Class-Path"
    {
        class_path = Some(current_value);
    }

    let Some(class_path) = class_path else {
        return Vec::new();
    };

    let base_dir = jar_path.parent().unwrap_or_else(|| Path::new(""));
    class_path
        .split_whitespace()
        .map(|entry| {
            let entry_path = PathBuf::from(entry);
            if entry_path.is_absolute() {
                entry_path
            } else {
                base_dir.join(entry_path)
            }
        })
        .collect()
}

fn is_jar_path(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("jar"))
}

fn is_overlay_path(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext == OVERLAY_EXTENSION)
}
