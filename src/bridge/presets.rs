//! Saved stream list: one name per line

use std::path::Path;

use crate::error::Result;

/// Read saved names. A missing file is an empty list.
pub fn load(path: &Path) -> Result<Vec<String>> {
    match std::fs::read_to_string(path) {
        Ok(text) => Ok(parse(&text)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(e.into()),
    }
}

/// Write names, creating the parent directory if needed
pub fn save(path: &Path, names: &[String]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(path, render(names))?;
    tracing::info!("Saved {} streams to {}", names.len(), path.display());
    Ok(())
}

pub fn parse(text: &str) -> Vec<String> {
    text.lines()
        .map(|line| line.trim_end_matches('\r'))
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

pub fn render(names: &[String]) -> String {
    let mut text = String::new();
    for name in names {
        text.push_str(name);
        text.push('\n');
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(tag: &str) -> std::path::PathBuf {
        std::env::temp_dir()
            .join(format!("jack-net-bridge-{}-{}", std::process::id(), tag))
            .join("presets.txt")
    }

    #[test]
    fn test_parse_skips_blank_lines() {
        let names = parse("Studio A (Mix)\r\n\nCam 2\n");
        assert_eq!(names, ["Studio A (Mix)", "Cam 2"]);
    }

    #[test]
    fn test_names_keep_inner_whitespace() {
        assert_eq!(parse("  padded name \n"), ["  padded name "]);
    }

    #[test]
    fn test_missing_file_is_empty() {
        assert!(load(&temp_path("missing")).unwrap().is_empty());
    }

    #[test]
    fn test_save_then_load() {
        let path = temp_path("roundtrip");
        let names = vec!["HOST (Program)".to_string(), "Other".to_string()];
        save(&path, &names).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "HOST (Program)\nOther\n");
        assert_eq!(load(&path).unwrap(), names);

        save(&path, &[]).unwrap();
        assert!(load(&path).unwrap().is_empty());
        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }
}
