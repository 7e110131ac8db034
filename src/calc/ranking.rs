use std::cmp::Ordering;

/// Sort key shared by every ranked view.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RankKey<'a> {
    pub points: f64,
    pub total_marks: Option<f64>,
    pub tiebreak: &'a str,
}

/// Anything that can be placed in a ranking. `None` keeps the item out of the
/// ranking entirely: it takes no rank slot and is not counted.
pub trait Rankable {
    fn rank_key(&self) -> Option<RankKey<'_>>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct Ranked<T> {
    pub rank: usize,
    pub item: T,
}

/// Higher points first, then higher total (missing totals last), then name.
pub fn compare_keys(a: &RankKey<'_>, b: &RankKey<'_>) -> Ordering {
    b.points
        .partial_cmp(&a.points)
        .unwrap_or(Ordering::Equal)
        .then_with(|| match (a.total_marks, b.total_marks) {
            (Some(x), Some(y)) => y.partial_cmp(&x).unwrap_or(Ordering::Equal),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        })
        .then_with(|| a.tiebreak.cmp(b.tiebreak))
}

fn shares_rank(a: &RankKey<'_>, b: &RankKey<'_>) -> bool {
    a.points == b.points && a.total_marks == b.total_marks
}

/// Competition ranking with gaps: `[12, 12, 10, 9]` ranks as `1, 1, 3, 4`.
pub fn rank<T: Rankable>(items: Vec<T>) -> Vec<Ranked<T>> {
    let mut keyed: Vec<T> = items.into_iter().filter(|i| i.rank_key().is_some()).collect();
    keyed.sort_by(|a, b| match (a.rank_key(), b.rank_key()) {
        (Some(ka), Some(kb)) => compare_keys(&ka, &kb),
        _ => Ordering::Equal,
    });

    let mut out: Vec<Ranked<T>> = Vec::with_capacity(keyed.len());
    for (idx, item) in keyed.into_iter().enumerate() {
        let tied = match (out.last().and_then(|p| p.item.rank_key()), item.rank_key()) {
            (Some(prev), Some(cur)) => shares_rank(&prev, &cur),
            _ => false,
        };
        let rank = match out.last() {
            Some(prev) if tied => prev.rank,
            _ => idx + 1,
        };
        out.push(Ranked { rank, item });
    }
    out
}
