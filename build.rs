use std::fs;
use std::path::Path;

fn main() {
    println!("cargo:rerun-if-changed=overlays/");

    let manifest_dir = std::env::var("CARGO_MANIFEST_DIR").unwrap();
    let overlays_dir = Path::new(&manifest_dir).join("overlays");

    let mut files: Vec<String> = fs::read_dir(&overlays_dir)
        .expect("overlays/ directory not found")
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().map(|t| t.is_file()).unwrap_or(false))
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .filter(|name| name.ends_with(".astub"))
        .collect();
    files.sort();

    let entries: String = files
        .iter()
        .map(|name| {
            let overlay_path = overlays_dir.join(name);
            format!("    ({:?}, include_str!({:?})),\n", name, overlay_path)
        })
        .collect();
    let content = format!(
        "pub(crate) static BUILTIN_OVERLAYS: &[(&str, &str)] = &[\n{}];\n",
        entries
    );

    let out_dir = std::env::var("OUT_DIR").unwrap();
    let dest = Path::new(&out_dir).join("builtin_overlays.rs");
    fs::write(dest, content).unwrap();
}
