//! Validation of untrusted strings before they reach player arguments or IPC values.

use std::path::{Component, Path, PathBuf};

use thiserror::Error;
use url::Url;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SanitizeError {
  #[error("Invalid media target: {0}")]
  InvalidTarget(String),
}

fn invalid(reason: impl Into<String>) -> SanitizeError {
  SanitizeError::InvalidTarget(reason.into())
}

/// Validate a media target (URL or local path) before it is passed to the player.
///
/// The target ends up as the trailing positional argument of the player
/// command line, so anything that could be read as a flag is rejected.
pub fn sanitize_target(raw: &str) -> Result<String, SanitizeError> {
  if raw.contains(['\0', '\n', '\r']) {
    return Err(invalid("control characters in target"));
  }

  let target = raw.trim();
  if target.is_empty() {
    return Err(invalid("empty target"));
  }
  if target.starts_with('-') {
    return Err(invalid("target must not start with '-'"));
  }

  if target.contains("://") {
    let url = Url::parse(target).map_err(|e| invalid(format!("malformed URL: {}", e)))?;
    return match url.scheme() {
      "http" | "https" => Ok(target.to_string()),
      other => Err(invalid(format!("unsupported URL scheme: {}", other))),
    };
  }

  let cleaned = clean_path(target);
  // "./-x" cleans down to "-x"
  if cleaned.starts_with('-') {
    return Ok(format!("./{}", cleaned));
  }
  Ok(cleaned)
}

/// Strip characters that break a single-line title (newlines, tabs, NUL).
pub fn sanitize_title(title: &str) -> String {
  title
    .chars()
    .filter(|c| *c != '\0')
    .map(|c| match c {
      '\n' | '\r' | '\t' => ' ',
      c => c,
    })
    .collect::<String>()
    .trim()
    .to_string()
}

/// Lexically normalize a local path: drop `.`, fold `..` into its parent.
fn clean_path(path: &str) -> String {
  let mut parts: Vec<Component> = Vec::new();
  for component in Path::new(path).components() {
    match component {
      Component::CurDir => {}
      Component::ParentDir => match parts.last() {
        Some(Component::Normal(_)) => {
          parts.pop();
        }
        Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
        _ => parts.push(component),
      },
      other => parts.push(other),
    }
  }

  if parts.is_empty() {
    return ".".to_string();
  }
  parts
    .iter()
    .collect::<PathBuf>()
    .to_string_lossy()
    .into_owned()
}
