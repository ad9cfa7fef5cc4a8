//! `--history` files: a saved conversation to resume.

use anyhow::{Context, Result};
use chatline::history::HistoryExchange;
use std::path::Path;

pub fn load(path: &Path) -> Result<HistoryExchange> {
    let s = std::fs::read_to_string(path)
        .with_context(|| format!("reading history from {}", path.display()))?;
    serde_json::from_str(&s).with_context(|| format!("parsing history from {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path() -> std::path::PathBuf {
        std::env::temp_dir().join(format!("chatline-history-{}.json", uuid::Uuid::new_v4()))
    }

    #[test]
    fn loads_exchange_from_file() {
        let path = temp_path();
        std::fs::write(
            &path,
            r#"{"topicId":"t1","sessionId":"s1","messages":[{"id":"r1","user":"q","bot":"a"}]}"#,
        )
        .unwrap();
        let exchange = load(&path).unwrap();
        let _ = std::fs::remove_file(&path);

        assert_eq!(exchange.topic_id, "t1");
        assert_eq!(exchange.session_id.as_deref(), Some("s1"));
        assert_eq!(exchange.messages.len(), 1);
    }

    #[test]
    fn missing_file_names_the_path() {
        let path = temp_path();
        let err = load(&path).unwrap_err();
        assert!(format!("{:#}", err).contains(&path.display().to_string()));
    }

    #[test]
    fn invalid_json_is_an_error() {
        let path = temp_path();
        std::fs::write(&path, "{not json").unwrap();
        let result = load(&path);
        let _ = std::fs::remove_file(&path);
        assert!(result.is_err());
    }
}
