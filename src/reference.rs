use facematch_vision::Embedding;
use std::path::Path;

use crate::error::InputError;

/// Parses a stored descriptor given as a JSON array of numbers.
pub fn parse_reference(raw: &str) -> Result<Embedding, InputError> {
    let values: Vec<f64> = serde_json::from_str(raw.trim()).map_err(InputError::MalformedReference)?;
    if values.is_empty() {
        return Err(InputError::EmptyReference);
    }
    let mut out = Vec::with_capacity(values.len());
    for (index, v) in values.into_iter().enumerate() {
        let v = v as f32;
        if !v.is_finite() {
            return Err(InputError::NonFiniteReference { index });
        }
        out.push(v);
    }
    Ok(Embedding::new(out))
}

pub fn read_reference(path: &Path) -> Result<Embedding, InputError> {
    let raw = std::fs::read_to_string(path).map_err(|source| InputError::UnreadableReference {
        path: path.to_path_buf(),
        source,
    })?;
    parse_reference(&raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_numbers() {
        let e = parse_reference(" [0.25, -1, 3e-2]\n").unwrap();
        assert_eq!(e.as_slice(), &[0.25, -1.0, 0.03]);
    }

    #[test]
    fn test_rejects_malformed_json() {
        assert!(matches!(
            parse_reference("[0.1, 0.2"),
            Err(InputError::MalformedReference(_))
        ));
        assert!(matches!(
            parse_reference(r#"{"descriptor": [0.1]}"#),
            Err(InputError::MalformedReference(_))
        ));
        assert!(matches!(
            parse_reference(r#"[0.1, "x"]"#),
            Err(InputError::MalformedReference(_))
        ));
    }

    #[test]
    fn test_rejects_empty() {
        assert!(matches!(parse_reference("[]"), Err(InputError::EmptyReference)));
    }

    #[test]
    fn test_rejects_values_outside_f32() {
        assert!(matches!(
            parse_reference("[0.0, 1e300]"),
            Err(InputError::NonFiniteReference { index: 1 })
        ));
    }

    #[test]
    fn test_reads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ref.json");
        std::fs::write(&path, "[1.0, 2.0]").unwrap();
        assert_eq!(read_reference(&path).unwrap().len(), 2);
        assert!(matches!(
            read_reference(&dir.path().join("missing.json")),
            Err(InputError::UnreadableReference { .. })
        ));
    }
}
