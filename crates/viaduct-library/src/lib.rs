//! Discovery and search of KiCad symbol and footprint libraries.
//!
//! Resolution order mirrors KiCad's own: the user's `sym-lib-table` /
//! `fp-lib-table` (with `${VAR}` URI expansion) first, then the well-known
//! installation directories and `KICAD9_*` / `KICAD8_*` / unversioned
//! environment variables. Resolution failure is never fatal; callers fall
//! back (e.g. to a skeleton footprint) when a library cannot be found.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use viaduct_sexpr::Document;

#[cfg(target_os = "macos")]
mod install {
    use std::path::PathBuf;

    pub(crate) fn candidates() -> Vec<PathBuf> {
        vec![PathBuf::from(
            "/Applications/KiCad/KiCad.app/Contents/SharedSupport",
        )]
    }

    pub(crate) fn config_base() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join("Library").join("Preferences"))
    }
}

#[cfg(target_os = "windows")]
mod install {
    use std::path::PathBuf;

    pub(crate) fn candidates() -> Vec<PathBuf> {
        vec![
            PathBuf::from(r"C:\Program Files\KiCad\9.0"),
            PathBuf::from(r"C:\Program Files\KiCad\8.0"),
        ]
    }

    pub(crate) fn config_base() -> Option<PathBuf> {
        dirs::config_dir()
    }
}

#[cfg(not(any(target_os = "macos", target_os = "windows")))]
mod install {
    use std::path::PathBuf;

    pub(crate) fn candidates() -> Vec<PathBuf> {
        vec![
            PathBuf::from("/usr/share/kicad"),
            PathBuf::from("/usr/local/share/kicad"),
        ]
    }

    pub(crate) fn config_base() -> Option<PathBuf> {
        dirs::config_dir()
    }
}

/// Resolve the KiCad environment variable map used for `${VAR}` expansion
/// in library table URIs.
pub fn kicad_env_paths() -> HashMap<String, PathBuf> {
    let mut paths = HashMap::new();

    for base in install::candidates() {
        let mut sym_dir = base.join("share").join("kicad").join("symbols");
        if !sym_dir.exists() {
            sym_dir = base.join("symbols");
        }
        let mut fp_dir = base.join("share").join("kicad").join("footprints");
        if !fp_dir.exists() {
            fp_dir = base.join("footprints");
        }
        let mut hit = false;
        if sym_dir.exists() {
            paths.insert("KICAD9_SYMBOL_DIR".to_string(), sym_dir.clone());
            paths.insert("KICAD8_SYMBOL_DIR".to_string(), sym_dir);
            hit = true;
        }
        if fp_dir.exists() {
            paths.insert("KICAD9_FOOTPRINT_DIR".to_string(), fp_dir.clone());
            paths.insert("KICAD8_FOOTPRINT_DIR".to_string(), fp_dir);
            hit = true;
        }
        if hit {
            break;
        }
    }

    // Explicit environment variables win over install-path guesses.
    for var in ["KICAD9_SYMBOL_DIR", "KICAD8_SYMBOL_DIR", "KICAD_SYMBOL_DIR"] {
        if let Some(p) = env_path(var) {
            paths.insert(var.to_string(), p);
            break;
        }
    }
    for var in [
        "KICAD9_FOOTPRINT_DIR",
        "KICAD8_FOOTPRINT_DIR",
        "KICAD_FOOTPRINT_DIR",
    ] {
        if let Some(p) = env_path(var) {
            paths.insert(var.to_string(), p);
            break;
        }
    }

    paths
}

fn env_path(var: &str) -> Option<PathBuf> {
    let val = std::env::var_os(var)?;
    let path = PathBuf::from(val);
    path.exists().then_some(path)
}

/// The KiCad user configuration directory (KiCad 9 preferred, then 8).
pub fn user_config_dir() -> Option<PathBuf> {
    let base = install::config_base()?;
    for ver in ["9.0", "8.0"] {
        let dir = base.join("kicad").join(ver);
        if dir.exists() {
            return Some(dir);
        }
    }
    Some(base.join("kicad").join("9.0"))
}

/// One row of a `sym-lib-table` / `fp-lib-table`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LibraryEntry {
    pub name: String,
    pub lib_type: String,
    /// URI with `${VAR}` references already expanded.
    pub uri: String,
    pub description: String,
}

/// Discovered symbol and footprint library tables.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LibTables {
    pub symbol_libraries: Vec<LibraryEntry>,
    pub footprint_libraries: Vec<LibraryEntry>,
}

/// Discover the user's library tables. Missing tables yield empty lists.
pub fn discover_lib_tables() -> Result<LibTables> {
    let env = kicad_env_paths();
    let Some(config) = user_config_dir() else {
        return Ok(LibTables::default());
    };

    let mut tables = LibTables::default();
    let sym_table = config.join("sym-lib-table");
    if sym_table.exists() {
        tables.symbol_libraries = parse_lib_table(&sym_table, &env)
            .with_context(|| format!("parsing {}", sym_table.display()))?;
    }
    let fp_table = config.join("fp-lib-table");
    if fp_table.exists() {
        tables.footprint_libraries = parse_lib_table(&fp_table, &env)
            .with_context(|| format!("parsing {}", fp_table.display()))?;
    }
    log::debug!(
        "discovered {} symbol and {} footprint libraries",
        tables.symbol_libraries.len(),
        tables.footprint_libraries.len()
    );
    Ok(tables)
}

/// Parse a library table file, expanding `${VAR}` URI references.
pub fn parse_lib_table(path: &Path, env: &HashMap<String, PathBuf>) -> Result<Vec<LibraryEntry>> {
    let doc = Document::load(path)?;
    let mut entries = Vec::new();
    for lib_node in doc.root.find_all("lib") {
        let field = |name: &str| {
            lib_node
                .find(name)
                .and_then(|n| n.first_value())
                .unwrap_or("")
                .to_string()
        };
        let mut uri = field("uri");
        for (var, val) in env {
            uri = uri.replace(&format!("${{{var}}}"), &val.to_string_lossy());
        }
        entries.push(LibraryEntry {
            name: field("name"),
            lib_type: field("type"),
            uri,
            description: field("descr"),
        });
    }
    Ok(entries)
}

/// Resolve a `library:footprint` id to a `.kicad_mod` file, if any library
/// source can supply it.
pub fn resolve_kicad_mod(lib_id: &str) -> Option<PathBuf> {
    let tables = discover_lib_tables().ok()?;
    resolve_kicad_mod_in(lib_id, &tables, &kicad_env_paths())
}

/// Table/env-driven resolution, separated out for testability.
pub fn resolve_kicad_mod_in(
    lib_id: &str,
    tables: &LibTables,
    env: &HashMap<String, PathBuf>,
) -> Option<PathBuf> {
    let (lib_name, fp_name) = lib_id.split_once(':')?;

    for entry in &tables.footprint_libraries {
        if entry.name == lib_name {
            let candidate = Path::new(&entry.uri).join(format!("{fp_name}.kicad_mod"));
            if candidate.exists() {
                return Some(candidate);
            }
        }
    }

    for var in [
        "KICAD9_FOOTPRINT_DIR",
        "KICAD8_FOOTPRINT_DIR",
        "KICAD_FOOTPRINT_DIR",
    ] {
        if let Some(dir) = env.get(var) {
            let candidate = dir
                .join(format!("{lib_name}.pretty"))
                .join(format!("{fp_name}.kicad_mod"));
            if candidate.exists() {
                return Some(candidate);
            }
        }
    }

    None
}

/// Summary of one pad inside a footprint file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FootprintPadInfo {
    pub number: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub pad_type: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub shape: String,
}

/// Summary of a `.kicad_mod` footprint file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FootprintInfo {
    pub name: String,
    pub library: String,
    pub description: String,
    pub tags: String,
    pub attribute: String,
    pub pad_count: usize,
    pub pads: Vec<FootprintPadInfo>,
}

/// List all footprints in a `.pretty` directory, sorted by file name.
pub fn list_footprints_in_library(lib_path: &Path) -> Vec<FootprintInfo> {
    if !lib_path.is_dir() {
        return Vec::new();
    }
    let lib_name = pretty_stem(lib_path);

    let mut files: Vec<PathBuf> = std::fs::read_dir(lib_path)
        .into_iter()
        .flatten()
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("kicad_mod"))
        .collect();
    files.sort();

    files
        .iter()
        .filter_map(|f| parse_footprint_file(f, &lib_name))
        .collect()
}

/// Details of a single `.kicad_mod` file, or `None` if unreadable.
pub fn footprint_details(mod_path: &Path) -> Option<FootprintInfo> {
    let lib_name = mod_path.parent().map(pretty_stem).unwrap_or_default();
    parse_footprint_file(mod_path, &lib_name)
}

fn pretty_stem(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("")
        .trim_end_matches(".pretty")
        .to_string()
}

fn parse_footprint_file(path: &Path, lib_name: &str) -> Option<FootprintInfo> {
    let doc = match Document::load(path) {
        Ok(doc) => doc,
        Err(err) => {
            log::warn!("skipping unreadable footprint {}: {err}", path.display());
            return None;
        }
    };
    let root = &doc.root;

    let first = |name: &str| {
        root.find(name)
            .and_then(|n| n.first_value())
            .unwrap_or("")
            .to_string()
    };

    let pads = root.find_all("pad");
    let pad_infos = pads
        .iter()
        .map(|pad| {
            let vals = pad.atom_values();
            FootprintPadInfo {
                number: vals.first().map(|s| s.to_string()).unwrap_or_default(),
                pad_type: vals.get(1).map(|s| s.to_string()).unwrap_or_default(),
                shape: vals.get(2).map(|s| s.to_string()).unwrap_or_default(),
            }
        })
        .collect();

    Some(FootprintInfo {
        name: root
            .first_value()
            .map(|s| s.to_string())
            .unwrap_or_else(|| {
                path.file_stem()
                    .and_then(|s| s.to_str())
                    .unwrap_or("")
                    .to_string()
            }),
        library: lib_name.to_string(),
        description: first("descr"),
        tags: first("tags"),
        attribute: first("attr"),
        pad_count: pads.len(),
        pads: pad_infos,
    })
}

/// Summary of a symbol scanned out of a `.kicad_sym` library.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SymbolInfo {
    pub name: String,
    pub library: String,
    pub reference: String,
    pub value: String,
    pub description: String,
    pub keywords: String,
    pub footprint: String,
    pub datasheet: String,
    pub pin_count: usize,
    pub is_power: bool,
}

// Compile-once regexes for the fast symbol scan. Symbol libraries can
// exceed 100 K lines, so a full S-expression parse is avoided.
static RE_TOP_SYMBOL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?m)^\t\(symbol\s+"([^"]+)""#).expect("valid regex"));
static RE_PROPERTY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"\(property\s+"([^"]+)"\s+"([^"]*)""#).expect("valid regex"));
static RE_POWER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\(power\)").expect("valid regex"));
static RE_PIN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\(pin\s+\w+\s+\w+").expect("valid regex"));

/// List the top-level symbols in a `.kicad_sym` file via regex scanning.
pub fn list_symbols_in_library(lib_path: &Path) -> Vec<SymbolInfo> {
    let lib_name = lib_path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("")
        .to_string();
    let Ok(text) = std::fs::read_to_string(lib_path) else {
        return Vec::new();
    };
    scan_symbols(&text, &lib_name)
}

fn scan_symbols(text: &str, lib_name: &str) -> Vec<SymbolInfo> {
    // Top-level symbols sit at indent depth one; unit sub-symbols carry a
    // `_N_N` suffix and are skipped.
    let mut starts: Vec<(usize, &str)> = Vec::new();
    for caps in RE_TOP_SYMBOL.captures_iter(text) {
        let m = caps.get(0).map(|m| m.start()).unwrap_or(0);
        let name = caps.get(1).map(|c| c.as_str()).unwrap_or("");
        let mut parts = name.rsplitn(3, '_');
        let unit_suffix = matches!(
            (parts.next(), parts.next(), parts.next()),
            (Some(a), Some(b), Some(_)) if !a.is_empty() && !b.is_empty()
                && a.chars().all(|c| c.is_ascii_digit())
                && b.chars().all(|c| c.is_ascii_digit())
        );
        if !unit_suffix {
            starts.push((m, name));
        }
    }

    let mut symbols = Vec::new();
    for (i, (start, name)) in starts.iter().enumerate() {
        let end = starts.get(i + 1).map(|(s, _)| *s).unwrap_or(text.len());
        let block = &text[*start..end];

        let mut props: HashMap<&str, &str> = HashMap::new();
        for caps in RE_PROPERTY.captures_iter(block) {
            if let (Some(k), Some(v)) = (caps.get(1), caps.get(2)) {
                props.insert(k.as_str(), v.as_str());
            }
        }
        let prop = |key: &str| props.get(key).copied().unwrap_or("").to_string();

        symbols.push(SymbolInfo {
            name: name.to_string(),
            library: lib_name.to_string(),
            reference: prop("Reference"),
            value: prop("Value"),
            description: prop("Description"),
            keywords: prop("ki_keywords"),
            footprint: prop("Footprint"),
            datasheet: prop("Datasheet"),
            pin_count: RE_PIN.find_iter(block).count(),
            is_power: RE_POWER.is_match(block),
        });
    }
    symbols
}

/// Search symbols across libraries by name, keyword, or description.
/// Libraries whose own name or description matches are scanned first.
pub fn search_symbols(
    query: &str,
    libraries: Option<&[LibraryEntry]>,
    max_results: usize,
) -> Result<Vec<SymbolInfo>> {
    let owned;
    let libraries = match libraries {
        Some(libs) => libs,
        None => {
            owned = discover_lib_tables()?.symbol_libraries;
            &owned
        }
    };

    let query = query.to_lowercase();
    let mut ordered: Vec<&LibraryEntry> = libraries.iter().collect();
    ordered.sort_by_key(|lib| {
        if lib.name.to_lowercase().contains(&query) {
            0
        } else if lib.description.to_lowercase().contains(&query) {
            1
        } else {
            2
        }
    });

    let mut results = Vec::new();
    for lib in ordered {
        let lib_path = PathBuf::from(&lib.uri);
        if !lib_path.exists() {
            continue;
        }
        for sym in list_symbols_in_library(&lib_path) {
            let matches = [&sym.name, &sym.keywords, &sym.description]
                .iter()
                .any(|f| f.to_lowercase().contains(&query));
            if matches {
                results.push(sym);
                if results.len() >= max_results {
                    return Ok(results);
                }
            }
        }
    }
    Ok(results)
}

/// Search footprints by name. Only `.kicad_mod` files whose file name (or
/// library name) matches the query are parsed.
pub fn search_footprints(
    query: &str,
    libraries: Option<&[LibraryEntry]>,
    max_results: usize,
) -> Result<Vec<FootprintInfo>> {
    let owned;
    let libraries = match libraries {
        Some(libs) => libs,
        None => {
            owned = discover_lib_tables()?.footprint_libraries;
            &owned
        }
    };

    let query = query.to_lowercase();
    let mut results = Vec::new();
    for lib in libraries {
        let lib_path = PathBuf::from(&lib.uri);
        if !lib_path.is_dir() {
            continue;
        }
        let lib_name = pretty_stem(&lib_path);

        let mut files: Vec<PathBuf> = std::fs::read_dir(&lib_path)
            .into_iter()
            .flatten()
            .flatten()
            .map(|e| e.path())
            .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("kicad_mod"))
            .collect();
        files.sort();

        for mod_file in files {
            let stem = mod_file
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("")
                .to_lowercase();
            if !stem.contains(&query) && !lib_name.to_lowercase().contains(&query) {
                continue;
            }
            if let Some(info) = parse_footprint_file(&mod_file, &lib_name) {
                results.push(info);
                if results.len() >= max_results {
                    return Ok(results);
                }
            }
        }
    }
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MOD_FILE: &str = r#"(footprint "R_0805_2012Metric"
  (version 20240108)
  (generator "pcbnew")
  (descr "Resistor SMD 0805")
  (tags "resistor")
  (attr smd)
  (pad "1" smd roundrect (at -0.9125 0) (size 1.025 1.4) (layers "F.Cu" "F.Paste" "F.Mask"))
  (pad "2" smd roundrect (at 0.9125 0) (size 1.025 1.4) (layers "F.Cu" "F.Paste" "F.Mask")))
"#;

    fn make_pretty(dir: &Path) -> PathBuf {
        let pretty = dir.join("Resistor_SMD.pretty");
        std::fs::create_dir(&pretty).unwrap();
        std::fs::write(pretty.join("R_0805_2012Metric.kicad_mod"), MOD_FILE).unwrap();
        pretty
    }

    #[test]
    fn parse_lib_table_expands_vars() {
        let dir = tempfile::tempdir().unwrap();
        let table = dir.path().join("fp-lib-table");
        std::fs::write(
            &table,
            "(fp_lib_table\n  (version 7)\n  (lib (name \"Resistor_SMD\") (type \"KiCad\") (uri \"${KICAD9_FOOTPRINT_DIR}/Resistor_SMD.pretty\") (options \"\") (descr \"SMD resistors\")))\n",
        )
        .unwrap();

        let mut env = HashMap::new();
        env.insert(
            "KICAD9_FOOTPRINT_DIR".to_string(),
            PathBuf::from("/opt/kicad/footprints"),
        );
        let entries = parse_lib_table(&table, &env).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "Resistor_SMD");
        assert_eq!(entries[0].uri, "/opt/kicad/footprints/Resistor_SMD.pretty");
        assert_eq!(entries[0].description, "SMD resistors");
    }

    #[test]
    fn list_and_detail_footprints() {
        let dir = tempfile::tempdir().unwrap();
        let pretty = make_pretty(dir.path());

        let infos = list_footprints_in_library(&pretty);
        assert_eq!(infos.len(), 1);
        let info = &infos[0];
        assert_eq!(info.name, "R_0805_2012Metric");
        assert_eq!(info.library, "Resistor_SMD");
        assert_eq!(info.pad_count, 2);
        assert_eq!(info.pads[0].pad_type, "smd");
        assert_eq!(info.attribute, "smd");

        let detail = footprint_details(&pretty.join("R_0805_2012Metric.kicad_mod")).unwrap();
        assert_eq!(detail, infos[0]);
    }

    #[test]
    fn resolve_via_table_then_env() {
        let dir = tempfile::tempdir().unwrap();
        let pretty = make_pretty(dir.path());

        let tables = LibTables {
            symbol_libraries: Vec::new(),
            footprint_libraries: vec![LibraryEntry {
                name: "Resistor_SMD".to_string(),
                lib_type: "KiCad".to_string(),
                uri: pretty.to_string_lossy().into_owned(),
                description: String::new(),
            }],
        };
        let resolved =
            resolve_kicad_mod_in("Resistor_SMD:R_0805_2012Metric", &tables, &HashMap::new())
                .unwrap();
        assert!(resolved.ends_with("R_0805_2012Metric.kicad_mod"));

        // Same thing through the footprint-dir environment variable.
        let mut env = HashMap::new();
        env.insert(
            "KICAD9_FOOTPRINT_DIR".to_string(),
            dir.path().to_path_buf(),
        );
        let resolved = resolve_kicad_mod_in(
            "Resistor_SMD:R_0805_2012Metric",
            &LibTables::default(),
            &env,
        )
        .unwrap();
        assert!(resolved.ends_with("R_0805_2012Metric.kicad_mod"));

        // Unknown footprints and malformed ids resolve to nothing.
        assert!(resolve_kicad_mod_in("Resistor_SMD:R_0402", &tables, &env).is_none());
        assert!(resolve_kicad_mod_in("NoColonHere", &tables, &env).is_none());
    }

    #[test]
    fn symbol_scan_skips_unit_subsymbols() {
        let text = "(kicad_symbol_lib\n\t(symbol \"R\"\n\t\t(property \"Reference\" \"R\")\n\t\t(property \"Value\" \"R\")\n\t\t(property \"ki_keywords\" \"resistor\")\n\t\t(pin passive line (at 0 0 0))\n\t\t(pin passive line (at 0 7.62 270))\n\t)\n\t(symbol \"R_0_1\"\n\t)\n\t(symbol \"GND\"\n\t\t(power)\n\t\t(property \"Reference\" \"#PWR\")\n\t)\n)\n";
        let symbols = scan_symbols(text, "Device");
        assert_eq!(symbols.len(), 2);
        assert_eq!(symbols[0].name, "R");
        assert_eq!(symbols[0].pin_count, 2);
        assert_eq!(symbols[0].keywords, "resistor");
        assert!(!symbols[0].is_power);
        assert_eq!(symbols[1].name, "GND");
        assert!(symbols[1].is_power);
    }

    #[test]
    fn footprint_search_matches_filenames() {
        let dir = tempfile::tempdir().unwrap();
        let pretty = make_pretty(dir.path());
        let libs = [LibraryEntry {
            name: "Resistor_SMD".to_string(),
            lib_type: "KiCad".to_string(),
            uri: pretty.to_string_lossy().into_owned(),
            description: String::new(),
        }];

        let hits = search_footprints("0805", Some(&libs), 10).unwrap();
        assert_eq!(hits.len(), 1);
        let misses = search_footprints("qfn", Some(&libs), 10).unwrap();
        assert!(misses.is_empty());
    }
}
