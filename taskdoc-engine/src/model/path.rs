// Model path parsing: `key.sub[2].leaf`

use super::{ModelError, ModelResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

/// A parsed dotted/indexed path into a model
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelPath {
    segments: Vec<PathSegment>,
}

impl ModelPath {
    pub fn parse(path: &str) -> ModelResult<Self> {
        let invalid = || ModelError::InvalidPath(path.to_string());

        if path.trim().is_empty() {
            return Err(invalid());
        }

        let mut segments = Vec::new();
        for part in path.split('.') {
            let (key, mut rest) = match part.find('[') {
                Some(pos) => (&part[..pos], &part[pos..]),
                None => (part, ""),
            };

            // `[0]` directly after a dot is only valid for the first part
            if key.is_empty() && (rest.is_empty() || !segments.is_empty()) {
                return Err(invalid());
            }
            if !key.is_empty() {
                segments.push(PathSegment::Key(key.to_string()));
            }

            while !rest.is_empty() {
                let close = rest.find(']').ok_or_else(invalid)?;
                let index = rest[1..close].trim().parse::<usize>().map_err(|_| invalid())?;
                segments.push(PathSegment::Index(index));
                rest = &rest[close + 1..];
                if !rest.is_empty() && !rest.starts_with('[') {
                    return Err(invalid());
                }
            }
        }

        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }
}
