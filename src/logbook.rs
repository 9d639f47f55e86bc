/// Parsed generation log: a header row followed by one row per generation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Logbook {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Option<f64>>>,
}

impl Logbook {
    /// Parse a whitespace-separated log. Blank lines are skipped and cells
    /// that are not numbers become `None`.
    pub fn parse(text: &str) -> Self {
        let mut lines = text.lines().filter(|l| !l.trim().is_empty());
        let Some(header) = lines.next() else {
            return Self::default();
        };
        let headers: Vec<String> = header.split_whitespace().map(str::to_string).collect();
        let rows = lines
            .map(|l| {
                l.split_whitespace()
                    .map(|c| c.parse::<f64>().ok().filter(|v| v.is_finite()))
                    .collect()
            })
            .collect();
        Self { headers, rows }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Values of a named column, one per row.
    pub fn column(&self, name: &str) -> Option<Vec<Option<f64>>> {
        let idx = self.headers.iter().position(|h| h == name)?;
        Some(
            self.rows
                .iter()
                .map(|r| r.get(idx).copied().flatten())
                .collect(),
        )
    }

    pub fn last(&self) -> Option<&[Option<f64>]> {
        self.rows.last().map(Vec::as_slice)
    }

    /// Value of `name` in the final generation.
    pub fn last_value(&self, name: &str) -> Option<f64> {
        let idx = self.headers.iter().position(|h| h == name)?;
        self.last()?.get(idx).copied().flatten()
    }

    /// Lowest and highest value a column ever reached.
    pub fn column_range(&self, name: &str) -> Option<(f64, f64)> {
        let values: Vec<f64> = self.column(name)?.into_iter().flatten().collect();
        if values.is_empty() {
            return None;
        }
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        Some((min, max))
    }
}
