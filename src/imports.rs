use serde::Deserialize;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Extensions the backend accepts for uploads.
const ALLOWED_EXTENSIONS: &[&str] = &["csv", "json", "txt"];

/// Third-party export formats the backend can ingest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportKind {
    /// Loyalty points CSV (`username,points`).
    StreamElements,
    /// Custom command JSON (`{"commands":[{"name","message"}]}`).
    Nightbot,
}

impl ImportKind {
    pub fn endpoint(self) -> &'static str {
        match self {
            Self::StreamElements => "/api/import/streamelements",
            Self::Nightbot => "/api/import/nightbot",
        }
    }

    /// The extension the export is normally saved with.
    pub fn expected_extension(self) -> &'static str {
        match self {
            Self::StreamElements => "csv",
            Self::Nightbot => "json",
        }
    }
}

impl fmt::Display for ImportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::StreamElements => "StreamElements",
            Self::Nightbot => "Nightbot",
        })
    }
}

impl FromStr for ImportKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "streamelements" | "se" => Ok(Self::StreamElements),
            "nightbot" | "nb" => Ok(Self::Nightbot),
            other => Err(format!(
                "Unknown import source '{}'. Supported: streamelements, nightbot",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ImportedUser {
    pub username: String,
    #[serde(default)]
    pub points: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ImportedCommand {
    pub trigger: String,
    #[serde(default)]
    pub response: String,
}

/// Successful import response. The backend only echoes the first few rows.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ImportSummary {
    pub imported: u64,
    pub users: Vec<ImportedUser>,
    pub commands: Vec<ImportedCommand>,
}

/// Check the file before uploading anything.
pub fn validate_upload(path: &Path) -> Result<(), String> {
    if !path.is_file() {
        return Err(format!("Select a file first ({} not found)", path.display()));
    }
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .unwrap_or_default();
    if !ALLOWED_EXTENSIONS.contains(&ext.as_str()) {
        return Err(format!(
            "File type not allowed: expected one of {}",
            ALLOWED_EXTENSIONS.join(", ")
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_parse_kind() {
        assert_eq!("StreamElements".parse::<ImportKind>(), Ok(ImportKind::StreamElements));
        assert_eq!("nb".parse::<ImportKind>(), Ok(ImportKind::Nightbot));
        assert!("moobot".parse::<ImportKind>().is_err());
        assert_eq!(ImportKind::Nightbot.endpoint(), "/api/import/nightbot");
    }

    #[test]
    fn test_validate_upload() {
        let dir = tempfile::tempdir().unwrap();
        let csv = dir.path().join("points.CSV");
        fs::write(&csv, "username,points\nviewer,10\n").unwrap();
        assert!(validate_upload(&csv).is_ok());

        let exe = dir.path().join("tool.exe");
        fs::write(&exe, "MZ").unwrap();
        assert!(validate_upload(&exe).unwrap_err().contains("not allowed"));

        assert!(validate_upload(&dir.path().join("missing.csv"))
            .unwrap_err()
            .contains("not found"));
    }

    #[test]
    fn test_summary_partial() {
        let summary: ImportSummary = serde_json::from_str(
            r#"{"status":"success","imported":2,"commands":[{"trigger":"discord","response":"join!"}]}"#,
        )
        .unwrap();
        assert_eq!(summary.imported, 2);
        assert!(summary.users.is_empty());
        assert_eq!(summary.commands[0].trigger, "discord");
    }
}
