use std::str::Lines;
use thiserror::Error;

/// Smallest declared case count for which a layout can be deduced.
///
/// With fewer cases the blank-line patterns overlap, so the preamble and
/// block-case shapes cannot be told apart.
pub const MIN_LAYOUT_CASES: usize = 3;

/// Errors raised while reading the structure of a multi-case test file.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LayoutError {
    /// The first line of the file is missing or not a non-negative integer.
    #[error("Invalid case count line {0:?}")]
    InvalidCaseCount(String),

    /// The file declares fewer than [`MIN_LAYOUT_CASES`] cases.
    #[error("insufficient cases: file declares {0}, at least 3 are required")]
    InsufficientCases(usize),

    /// The number of blank lines matches none of the accepted layouts.
    #[error("undeducible layout: {blank_lines} blank lines for {cases} cases")]
    UndeducibleLayout { cases: usize, blank_lines: usize },

    /// A `CountAndSeed` file has no seed line after the case count.
    #[error("Missing seed line after the case count")]
    MissingSeedLine,

    /// The file ended before the requested case started.
    #[error("truncated case: file ended before case {0}")]
    TruncatedCase(usize),

    /// A case index outside `1..=cases` was requested.
    #[error("Invalid case number {index}, file has {cases} cases")]
    InvalidCaseIndex { index: usize, cases: usize },
}

/// How the lines before the case payload are laid out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HeaderShape {
    /// Line 1 is the case count. Generated judge inputs use this shape.
    #[default]
    Count,
    /// Line 1 is the case count and line 2 a seed for the generator.
    ///
    /// Reduced files are always written with a plain [`HeaderShape::Count`]
    /// header; the seed line is not carried over.
    CountAndSeed,
}

/// Structural shape of a multi-case test file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaseLayout {
    /// Case count declared by the analysed file.
    pub case_count: usize,
    /// A shared block, terminated by a blank line, precedes the cases.
    pub has_preamble: bool,
    /// Every case is exactly one line; otherwise cases are blank-delimited blocks.
    pub single_line_cases: bool,
    pub header: HeaderShape,
}

impl CaseLayout {
    /// Deduces the layout of a file whose first line is the case count.
    pub fn analyze(content: &str) -> Result<Self, LayoutError> {
        Self::analyze_with(content, HeaderShape::Count)
    }

    /// Deduces the layout of `content` from its declared case count and the
    /// number of blank lines it contains.
    pub fn analyze_with(content: &str, header: HeaderShape) -> Result<Self, LayoutError> {
        let blank_lines = content.lines().filter(|line| line.trim().is_empty()).count();
        let cases = declared_cases(content)?;
        if cases < MIN_LAYOUT_CASES {
            return Err(LayoutError::InsufficientCases(cases));
        }
        if ![0, 1, cases - 1, cases].contains(&blank_lines) {
            return Err(LayoutError::UndeducibleLayout { cases, blank_lines });
        }

        Ok(Self {
            case_count: cases,
            has_preamble: blank_lines == 1 || blank_lines == cases,
            single_line_cases: blank_lines < 2,
            header,
        })
    }

    /// Reads the next case from `cursor`.
    ///
    /// Single-line cases consume exactly one line. Block cases consume trimmed
    /// lines up to and including the next blank line, which is not returned.
    pub fn read_case<'a>(&self, cursor: &mut Lines<'a>) -> Option<Vec<&'a str>> {
        if self.single_line_cases {
            return cursor.next().map(|line| vec![line]);
        }
        let first = cursor.next()?;
        let mut case = Vec::new();
        if !first.trim().is_empty() {
            case.push(first.trim());
            case.extend(read_to_blank(cursor));
        }
        Some(case)
    }

    /// Splits `content` into two standalone files holding the first `⌊N/2⌋`
    /// and the remaining cases, `N` being the count `content` itself declares.
    ///
    /// The preamble, if any, is duplicated into both halves.
    pub fn split_in_half(&self, content: &str) -> Result<(String, String), LayoutError> {
        let (cases, mut cursor) = self.open(content)?;
        let half = cases / 2;

        let mut first_part = vec![half.to_string()];
        let mut second_part = vec![(cases - half).to_string()];

        if self.has_preamble {
            let preamble = read_to_blank(&mut cursor);
            for part in [&mut first_part, &mut second_part] {
                part.extend(preamble.iter().map(|line| line.to_string()));
                part.push(String::new());
            }
        }

        for index in 0..cases {
            let case = self
                .read_case(&mut cursor)
                .ok_or(LayoutError::TruncatedCase(index + 1))?;
            let destination = if index < half {
                &mut first_part
            } else {
                &mut second_part
            };
            destination.extend(case.into_iter().map(str::to_string));
            if !self.single_line_cases {
                destination.push(String::new());
            }
        }

        if !self.single_line_cases {
            for part in [&mut first_part, &mut second_part] {
                if part.len() > 1 {
                    part.pop();
                }
            }
        }

        Ok((render(&first_part), render(&second_part)))
    }

    /// Builds a one-case file holding the preamble and the case at the
    /// 1-based `index`.
    pub fn pick_case(&self, content: &str, index: usize) -> Result<String, LayoutError> {
        let (cases, mut cursor) = self.open(content)?;
        if index < 1 || index > cases {
            return Err(LayoutError::InvalidCaseIndex { index, cases });
        }

        let mut picked = vec!["1".to_string()];
        if self.has_preamble {
            picked.extend(read_to_blank(&mut cursor).into_iter().map(str::to_string));
            picked.push(String::new());
        }
        for skipped in 1..index {
            self.read_case(&mut cursor)
                .ok_or(LayoutError::TruncatedCase(skipped))?;
        }
        let case = self
            .read_case(&mut cursor)
            .ok_or(LayoutError::TruncatedCase(index))?;
        picked.extend(case.into_iter().map(str::to_string));

        Ok(render(&picked))
    }

    /// Returns the declared case count and a cursor positioned after the header.
    fn open<'a>(&self, content: &'a str) -> Result<(usize, Lines<'a>), LayoutError> {
        let cases = declared_cases(content)?;
        let mut cursor = content.lines();
        cursor.next();
        if self.header == HeaderShape::CountAndSeed && cursor.next().is_none() {
            return Err(LayoutError::MissingSeedLine);
        }
        Ok((cases, cursor))
    }
}

/// Parses the case count on the first line of `content`.
pub fn declared_cases(content: &str) -> Result<usize, LayoutError> {
    let first = content.lines().next().unwrap_or_default();
    first
        .trim()
        .parse::<usize>()
        .map_err(|_| LayoutError::InvalidCaseCount(first.to_string()))
}

fn read_to_blank<'a>(cursor: &mut Lines<'a>) -> Vec<&'a str> {
    cursor
        .map(str::trim)
        .take_while(|line| !line.is_empty())
        .collect()
}

fn render(lines: &[String]) -> String {
    let mut out = String::new();
    for line in lines {
        out.push_str(line);
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cases_of(layout: &CaseLayout, content: &str) -> Vec<Vec<String>> {
        let (cases, mut cursor) = layout.open(content).unwrap();
        if layout.has_preamble {
            read_to_blank(&mut cursor);
        }
        (0..cases)
            .map(|_| {
                layout
                    .read_case(&mut cursor)
                    .unwrap()
                    .into_iter()
                    .map(str::to_string)
                    .collect()
            })
            .collect()
    }

    #[test]
    fn seeded_single_line_file_splits_into_plain_halves() {
        let content = "5\n42\n1\n2\n3\n4\n5\n";
        let layout = CaseLayout::analyze_with(content, HeaderShape::CountAndSeed).unwrap();
        assert_eq!(layout.case_count, 5);
        assert!(!layout.has_preamble);
        assert!(layout.single_line_cases);

        let (first, second) = layout.split_in_half(content).unwrap();
        assert_eq!(first, "2\n1\n2\n");
        assert_eq!(second, "3\n3\n4\n5\n");
    }

    #[test]
    fn blank_line_patterns_map_to_layouts() {
        let single = CaseLayout::analyze("3\na\nb\nc\n").unwrap();
        assert!(!single.has_preamble && single.single_line_cases);

        let single_with_preamble = CaseLayout::analyze("3\nshared\n\na\nb\nc\n").unwrap();
        assert!(single_with_preamble.has_preamble && single_with_preamble.single_line_cases);

        let blocks = CaseLayout::analyze("3\na\na\n\nb\n\nc\nc\n").unwrap();
        assert!(!blocks.has_preamble && !blocks.single_line_cases);

        let blocks_with_preamble = CaseLayout::analyze("3\np\n\na\n\nb\n\nc\n").unwrap();
        assert!(blocks_with_preamble.has_preamble && !blocks_with_preamble.single_line_cases);
    }

    #[test]
    fn too_few_cases_are_rejected() {
        assert_eq!(
            CaseLayout::analyze("2\na\nb\n"),
            Err(LayoutError::InsufficientCases(2))
        );
    }

    #[test]
    fn unmatched_blank_count_is_undeducible() {
        let content = "5\na\n\nb\n\nc\nd\ne\n";
        assert_eq!(
            CaseLayout::analyze(content),
            Err(LayoutError::UndeducibleLayout {
                cases: 5,
                blank_lines: 2
            })
        );
    }

    #[test]
    fn non_numeric_count_is_a_parse_error() {
        assert!(matches!(
            CaseLayout::analyze("many\na\nb\nc\n"),
            Err(LayoutError::InvalidCaseCount(_))
        ));
        assert!(matches!(
            CaseLayout::analyze(""),
            Err(LayoutError::InvalidCaseCount(_))
        ));
    }

    #[test]
    fn block_halves_duplicate_preamble_and_trim_trailing_separator() {
        let content = "4\nP1\nP2\n\na1\na2\n\nb1\n\nc1\nc2\n\nd1\n";
        let layout = CaseLayout::analyze(content).unwrap();
        assert!(layout.has_preamble && !layout.single_line_cases);

        let (first, second) = layout.split_in_half(content).unwrap();
        assert_eq!(first, "2\nP1\nP2\n\na1\na2\n\nb1\n");
        assert_eq!(second, "2\nP1\nP2\n\nc1\nc2\n\nd1\n");
    }

    #[test]
    fn halves_of_halves_reuse_the_original_layout() {
        let content = "3\np\n\nx\ny\nz\n";
        let layout = CaseLayout::analyze(content).unwrap();
        let (first, second) = layout.split_in_half(content).unwrap();
        assert_eq!(first, "1\np\n\nx\n");
        assert_eq!(second, "2\np\n\ny\nz\n");

        let (empty, single) = layout.split_in_half(&first).unwrap();
        assert_eq!(empty, "0\np\n\n");
        assert_eq!(single, "1\np\n\nx\n");
    }

    #[test]
    fn split_counts_always_sum_to_declared_cases() {
        for cases in 3..12usize {
            let body: String = (1..=cases).map(|i| format!("{i}\n")).collect();
            let content = format!("{cases}\n{body}");
            let layout = CaseLayout::analyze(&content).unwrap();
            let (first, second) = layout.split_in_half(&content).unwrap();
            let total = declared_cases(&first).unwrap() + declared_cases(&second).unwrap();
            assert_eq!(total, cases);
            assert_eq!(cases_of(&layout, &first).len() + cases_of(&layout, &second).len(), cases);
        }
    }

    #[test]
    fn picking_every_case_reconstructs_the_original_order() {
        let content = "4\nhead\n\nw x\n\ny\nz\n\nq\n\nr r\n";
        let layout = CaseLayout::analyze(content).unwrap();
        let original = cases_of(&layout, content);

        let picked: Vec<Vec<String>> = (1..=layout.case_count)
            .map(|index| {
                let single = layout.pick_case(content, index).unwrap();
                assert!(single.starts_with("1\nhead\n\n"));
                cases_of(&layout, &single).remove(0)
            })
            .collect();
        assert_eq!(picked, original);
    }

    #[test]
    fn pick_case_rejects_out_of_range_indices() {
        let content = "3\na\nb\nc\n";
        let layout = CaseLayout::analyze(content).unwrap();
        assert_eq!(layout.pick_case(content, 2).unwrap(), "1\nb\n");
        assert_eq!(
            layout.pick_case(content, 0),
            Err(LayoutError::InvalidCaseIndex { index: 0, cases: 3 })
        );
        assert_eq!(
            layout.pick_case(content, 4),
            Err(LayoutError::InvalidCaseIndex { index: 4, cases: 3 })
        );
    }

    #[test]
    fn truncated_files_are_reported() {
        let layout = CaseLayout::analyze("3\na\nb\nc\n").unwrap();
        assert_eq!(
            layout.split_in_half("4\na\nb\nc\n"),
            Err(LayoutError::TruncatedCase(4))
        );
    }
}
