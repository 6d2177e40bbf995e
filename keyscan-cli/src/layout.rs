//! Text rendering of a key mapping, one cell per matrix intersection.

use keyscan_keymap::{KeyMapping, Position};

/// Render `mapping` as a boxed grid with row and column indices.
///
/// ```text
///      c0       c1
///    +--------+--------+
/// r0 | Esc    | A      |
///    +--------+--------+
/// ```
pub fn render(mapping: &KeyMapping) -> String {
    let labels: Vec<Vec<String>> = (0..mapping.rows())
        .map(|row| {
            (0..mapping.columns())
                .map(|col| {
                    mapping
                        .resolve(Position::new(row, col))
                        .map(|kc| kc.name().to_string())
                        .unwrap_or_default()
                })
                .collect()
        })
        .collect();

    let width = labels
        .iter()
        .flatten()
        .map(String::len)
        .chain(std::iter::once(format!("c{}", mapping.columns())).map(|s| s.len()))
        .max()
        .unwrap_or(1);
    let margin = format!("r{}", mapping.rows()).len() + 1;

    let separator = {
        let mut line = " ".repeat(margin);
        for _ in 0..mapping.columns() {
            line.push('+');
            line.push_str(&"-".repeat(width + 2));
        }
        line.push_str("+\n");
        line
    };

    let mut out = " ".repeat(margin);
    for col in 0..mapping.columns() {
        out.push_str(&format!("  {:<width$} ", format!("c{col}")));
    }
    out.truncate(out.trim_end().len());
    out.push('\n');
    out.push_str(&separator);

    for (row, cells) in labels.iter().enumerate() {
        out.push_str(&format!("{:<margin$}", format!("r{row}")));
        for label in cells {
            out.push_str(&format!("| {:<width$} ", label));
        }
        out.push_str("|\n");
        out.push_str(&separator);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use keyscan_keymap::{layouts, Keycode};

    #[test]
    fn test_render_small_mapping() {
        let mapping = KeyMapping::from_rows(vec![
            vec![Keycode::Escape, Keycode::A],
            vec![Keycode::Space, Keycode::LShift],
        ])
        .unwrap();
        let text = render(&mapping);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 6);
        assert!(lines[0].contains("c0") && lines[0].contains("c1"));
        assert!(lines[2].starts_with("r0"));
        assert!(lines[2].contains(Keycode::Escape.name()));
        assert!(lines[4].contains(Keycode::LShift.name()));

        // Every bordered line has the same width.
        let widths: Vec<usize> = lines[1..].iter().map(|l| l.len()).collect();
        assert!(widths.windows(2).all(|w| w[0] == w[1]), "{text}");
    }

    #[test]
    fn test_render_macropad() {
        let text = render(&layouts::macropad_4x5());
        assert_eq!(text.lines().count(), 1 + 2 * 4 + 1);
        assert!(text.contains(Keycode::KpEnter.name()));
    }
}
