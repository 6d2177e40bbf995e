use anyhow::{bail, Context, Result};
use keyscan_driver::matrix::Grid;
use keyscan_driver::{MatrixSample, SampleError, ScriptedSampler};

/// A parsed sample script: one entry per scan cycle.
#[derive(Debug, Clone)]
pub struct Script {
    pub rows: usize,
    pub columns: usize,
    pub samples: Vec<Result<MatrixSample, SampleError>>,
}

impl Script {
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn into_sampler(self) -> ScriptedSampler {
        ScriptedSampler::from_results(self.samples)
    }
}

/// Rows of the frame currently being read, with the line it started on.
struct PendingFrame {
    line: usize,
    rows: Vec<Vec<bool>>,
}

/// Parse a sample script.
///
/// Frames are blocks of `0`/`1` rows separated by blank lines. `#` starts a
/// comment. Directives stand on their own line:
/// - `repeat N`: sample the previous frame N more times
/// - `glitch`: one transient sampler error
pub fn parse_script(input: &str) -> Result<Script> {
    let mut samples: Vec<Result<MatrixSample, SampleError>> = Vec::new();
    let mut shape: Option<(usize, usize)> = None;
    let mut last: Option<MatrixSample> = None;
    let mut pending: Option<PendingFrame> = None;

    for (line_num, line) in input.lines().enumerate() {
        let line_no = line_num + 1;
        let line = line.split('#').next().unwrap_or("").trim();

        if line.is_empty() {
            close_frame(&mut pending, &mut shape, &mut last, &mut samples)?;
            continue;
        }

        let tokens: Vec<&str> = line.split_whitespace().collect();

        if tokens[0] == "repeat" {
            close_frame(&mut pending, &mut shape, &mut last, &mut samples)?;
            let [_, count] = tokens[..] else {
                bail!("line {}: expected `repeat N`", line_no);
            };
            let count: usize = count
                .parse()
                .with_context(|| format!("line {}: invalid repeat count", line_no))?;
            let Some(frame) = &last else {
                bail!("line {}: repeat before any frame", line_no);
            };
            samples.extend((0..count).map(|_| Ok(frame.clone())));
            continue;
        }

        if tokens[..] == ["glitch"] {
            close_frame(&mut pending, &mut shape, &mut last, &mut samples)?;
            samples.push(Err(SampleError::transient(format!(
                "scripted glitch at line {}",
                line_no
            ))));
            continue;
        }

        let row = line
            .chars()
            .filter(|c| !c.is_whitespace())
            .map(|c| match c {
                '0' => Ok(false),
                '1' => Ok(true),
                other => bail!("line {}: unexpected character '{}'", line_no, other),
            })
            .collect::<Result<Vec<bool>>>()?;

        pending
            .get_or_insert_with(|| PendingFrame {
                line: line_no,
                rows: Vec::new(),
            })
            .rows
            .push(row);
    }
    close_frame(&mut pending, &mut shape, &mut last, &mut samples)?;

    let Some((rows, columns)) = shape else {
        bail!("script contains no frames");
    };
    Ok(Script {
        rows,
        columns,
        samples,
    })
}

fn close_frame(
    pending: &mut Option<PendingFrame>,
    shape: &mut Option<(usize, usize)>,
    last: &mut Option<MatrixSample>,
    samples: &mut Vec<Result<MatrixSample, SampleError>>,
) -> Result<()> {
    let Some(frame) = pending.take() else {
        return Ok(());
    };
    let line = frame.line;
    let Some(grid) = Grid::from_rows(frame.rows) else {
        bail!("line {}: frame rows differ in length", line);
    };

    let found = (grid.rows(), grid.columns());
    match *shape {
        None => *shape = Some(found),
        Some(expected) if expected != found => bail!(
            "line {}: frame is {}x{}, expected {}x{}",
            line,
            found.0,
            found.1,
            expected.0,
            expected.1
        ),
        Some(_) => {}
    }

    samples.push(Ok(grid.clone()));
    *last = Some(grid);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use keyscan_driver::Position;

    #[test]
    fn test_parse_frames() {
        let script = "\
            # two frames, 2x3
            000
            010

            001
            000
        ";
        let script = parse_script(script).unwrap();
        assert_eq!((script.rows, script.columns), (2, 3));
        assert_eq!(script.len(), 2);

        let first = script.samples[0].as_ref().unwrap();
        assert_eq!(first.get(Position::new(1, 1)), Some(true));
        assert_eq!(first.count_pressed(), 1);
        let second = script.samples[1].as_ref().unwrap();
        assert_eq!(second.get(Position::new(0, 2)), Some(true));
    }

    #[test]
    fn test_repeat_and_glitch() {
        let script = "\
            1 0
            0 0
            repeat 3
            glitch
            00
            00
        ";
        let script = parse_script(script).unwrap();
        assert_eq!(script.len(), 6);
        assert!(script.samples[..4]
            .iter()
            .all(|s| s.as_ref().unwrap().get(Position::new(0, 0)) == Some(true)));
        assert!(matches!(script.samples[4], Err(SampleError::Transient(_))));
        assert_eq!(script.samples[5].as_ref().unwrap().count_pressed(), 0);
    }

    #[test]
    fn test_errors_carry_line_numbers() {
        let err = parse_script("01\n0x\n").unwrap_err();
        assert!(err.to_string().starts_with("line 2:"), "{err}");

        let err = parse_script("01\n011\n").unwrap_err();
        assert!(err.to_string().starts_with("line 1:"), "{err}");

        let err = parse_script("01\n10\n\n1\n").unwrap_err();
        assert!(err.to_string().contains("expected 2x2"), "{err}");

        let err = parse_script("# nothing yet\nrepeat 2\n").unwrap_err();
        assert!(err.to_string().starts_with("line 2:"), "{err}");

        assert!(parse_script("01\nrepeat many\n").is_err());
        assert!(parse_script("01\nrepeat 2 3\n").is_err());
        assert!(parse_script("# only comments\n\n").is_err());
    }

    #[test]
    fn test_directives_need_whole_words() {
        let err = parse_script("01\nrepeat2\n").unwrap_err();
        assert!(err.to_string().starts_with("line 2: unexpected character 'r'"), "{err}");

        let err = parse_script("01\nglitchy\n").unwrap_err();
        assert!(err.to_string().starts_with("line 2:"), "{err}");

        let script = parse_script("01\n  repeat   2  # hold\n").unwrap();
        assert_eq!(script.len(), 3);
    }

    #[test]
    fn test_sampler_replays_script() {
        use keyscan_driver::MatrixSampler;

        let mut sampler = parse_script("1\nglitch\n0\n").unwrap().into_sampler();
        assert_eq!(sampler.sample().unwrap().count_pressed(), 1);
        assert!(sampler.sample().is_err());
        assert_eq!(sampler.sample().unwrap().count_pressed(), 0);
        assert!(matches!(sampler.sample(), Err(SampleError::Fatal(_))));
    }
}
