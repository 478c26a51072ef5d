/// Levenshtein distance over chars.
pub fn levenshtein(a: &str, b: &str) -> usize {
    if a == b {
        return 0;
    }
    let b_chars: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b_chars.len()).collect();
    let mut curr = vec![0usize; b_chars.len() + 1];

    for (i, a_char) in a.chars().enumerate() {
        curr[0] = i + 1;
        for (j, b_char) in b_chars.iter().enumerate() {
            let cost = usize::from(a_char != *b_char);
            let insert = curr[j] + 1;
            let delete = prev[j + 1] + 1;
            let replace = prev[j] + cost;
            curr[j + 1] = insert.min(delete).min(replace);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b_chars.len()]
}

/// Up to `limit` candidates ordered by edit distance to `name`, then alphabetically.
pub fn closest_names<'a, I>(name: &str, candidates: I, limit: usize) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut ranked: Vec<(usize, &str)> = candidates
        .into_iter()
        .map(|candidate| (levenshtein(name, candidate), candidate))
        .collect();
    ranked.sort();
    ranked.dedup();
    ranked
        .into_iter()
        .take(limit)
        .map(|(_, candidate)| candidate.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distances() {
        assert_eq!(levenshtein("kitten", "sitting"), 3);
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("px", "px"), 0);
    }

    #[test]
    fn closest_first() {
        let names = ["Muon_Px", "Muon_Py", "Jet_E", "nMuon"];
        let ranked = closest_names("Muon_pz", names.iter().copied(), 2);
        assert_eq!(ranked, vec!["Muon_Px".to_string(), "Muon_Py".to_string()]);
    }
}
