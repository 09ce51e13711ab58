//! Test utilities for lsplink
//!
//! This module provides common test utilities including temporary directory
//! management, test file creation, and assertion helpers.

use tempfile::TempDir;

use std::path::PathBuf;

/// Create a temporary directory for testing
///
/// # Returns
///
/// Returns a TempDir that will be cleaned up when dropped
pub fn temp_dir() -> TempDir {
    TempDir::new().expect("Failed to create temporary directory")
}

/// Create a test file with the given content
///
/// # Arguments
///
/// * `dir` - Directory to create the file in
/// * `name` - Name of the file
/// * `content` - Content to write to the file
///
/// # Returns
///
/// Returns the path to the created file
///
/// # Panics
///
/// Panics if file creation or writing fails
pub fn create_test_file(dir: &TempDir, name: &str, content: &str) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, content).expect("Failed to write test file");
    path
}

/// Assert that a result is an error whose message contains the expected text
///
/// # Panics
///
/// Panics if the result is Ok or if the error doesn't contain the expected
/// message
pub fn assert_error_contains<T: std::fmt::Debug>(
    result: crate::error::Result<T>,
    expected: &str,
) {
    match result {
        Ok(v) => panic!("Expected error containing '{expected}' but got Ok({v:?})"),
        Err(e) => {
            let error_msg = e.to_string();
            assert!(
                error_msg.contains(expected),
                "Error message '{error_msg}' does not contain '{expected}'"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LspLinkError;

    #[test]
    fn test_temp_dir_creation() {
        let dir = temp_dir();
        assert!(dir.path().exists());
    }

    #[test]
    fn test_create_test_file() {
        let dir = temp_dir();
        let path = create_test_file(&dir, "test.txt", "content");
        assert!(path.exists());
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "content");
    }

    #[test]
    fn test_assert_error_contains_success() {
        let result: crate::error::Result<()> =
            Err(anyhow::anyhow!(LspLinkError::Config("test error message".to_string())));
        assert_error_contains(result, "test error");
    }

    #[test]
    #[should_panic(expected = "Expected error containing")]
    fn test_assert_error_contains_ok() {
        let result: crate::error::Result<()> = Ok(());
        assert_error_contains(result, "error");
    }

    #[test]
    #[should_panic(expected = "does not contain")]
    fn test_assert_error_contains_wrong_message() {
        let result: crate::error::Result<()> =
            Err(anyhow::anyhow!(LspLinkError::Config("different error".to_string())));
        assert_error_contains(result, "not present");
    }
}
