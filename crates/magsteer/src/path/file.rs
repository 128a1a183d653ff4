//! Checkpoint files: one `x,y` line per checkpoint in physical units,
//! CRLF-terminated, no header.

use std::path::Path;

use super::PathError;

/// Parse checkpoint lines. LF and CRLF endings are accepted and blank lines
/// are skipped.
pub fn parse_path(text: &str) -> Result<Vec<[f64; 2]>, PathError> {
    let mut points = Vec::new();
    for (i, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }
        let parse_err = |reason: String| PathError::Parse { line: i + 1, reason };

        let mut fields = line.split(',');
        let (Some(x), Some(y), None) = (fields.next(), fields.next(), fields.next()) else {
            return Err(parse_err(format!("expected 'x,y', got '{}'", line)));
        };
        let x: f64 = x
            .trim()
            .parse()
            .map_err(|e| parse_err(format!("bad x '{}': {}", x.trim(), e)))?;
        let y: f64 = y
            .trim()
            .parse()
            .map_err(|e| parse_err(format!("bad y '{}': {}", y.trim(), e)))?;
        if !x.is_finite() || !y.is_finite() {
            return Err(parse_err("coordinates must be finite".to_string()));
        }
        points.push([x, y]);
    }
    Ok(points)
}

/// Render checkpoints in the on-disk format.
pub fn format_path(points: &[[f64; 2]]) -> String {
    let mut out = String::new();
    for p in points {
        out.push_str(&format!("{},{}\r\n", p[0], p[1]));
    }
    out
}

pub fn read_path_file(path: &Path) -> Result<Vec<[f64; 2]>, PathError> {
    let text = std::fs::read_to_string(path)?;
    let points = parse_path(&text)?;
    tracing::info!("loaded {} checkpoints from {}", points.len(), path.display());
    Ok(points)
}

pub fn write_path_file(path: &Path, points: &[[f64; 2]]) -> Result<(), PathError> {
    std::fs::write(path, format_path(points))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_crlf_lines() {
        assert_eq!(format_path(&[[1.5, -2.0], [0.0, 10.25]]), "1.5,-2\r\n0,10.25\r\n");
    }

    #[test]
    fn reads_mixed_endings_and_blank_lines() {
        let pts = parse_path("1.5,-2\r\n\r\n 3 , 4 \n0,10.25").unwrap();
        assert_eq!(pts, vec![[1.5, -2.0], [3.0, 4.0], [0.0, 10.25]]);
        assert_eq!(parse_path(&format_path(&pts)).unwrap(), pts);
    }

    #[test]
    fn reports_malformed_line_number() {
        let err = parse_path("1,2\r\n3;4\r\n").unwrap_err();
        assert!(matches!(err, PathError::Parse { line: 2, .. }));
        let err = parse_path("1,2\n\n1,2,3\n").unwrap_err();
        assert!(matches!(err, PathError::Parse { line: 3, .. }));
        let err = parse_path("1,abc").unwrap_err();
        assert!(matches!(err, PathError::Parse { line: 1, .. }));
        assert!(parse_path("inf,0").is_err());
    }

    #[test]
    fn empty_file_has_no_checkpoints() {
        assert!(parse_path("").unwrap().is_empty());
    }
}
