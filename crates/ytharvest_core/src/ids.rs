/// Lazily split input lines on whitespace into video identifiers.
///
/// Blank lines yield nothing. The sequence is consumed once, left to right.
pub fn identifiers<I>(lines: I) -> impl Iterator<Item = String>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    lines.into_iter().flat_map(|line| {
        line.as_ref()
            .split_whitespace()
            .map(ToOwned::to_owned)
            .collect::<Vec<_>>()
    })
}
