use std::collections::{HashMap, HashSet};
use std::hash::Hash;

pub mod validation;

/// Cosine similarity between two sparse maps over the union of their keys,
/// missing keys treated as 0. Returns 0 if either map is empty or all-zero.
pub fn cosine_similarity_map<K: Eq + Hash + Clone>(
    a: &HashMap<K, f64>,
    b: &HashMap<K, f64>,
) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    let keys: HashSet<&K> = a.keys().chain(b.keys()).collect();

    let mut dot = 0.0;
    let mut norm_a = 0.0;
    let mut norm_b = 0.0;
    for key in keys {
        let x = a.get(key).copied().unwrap_or(0.0);
        let y = b.get(key).copied().unwrap_or(0.0);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a.sqrt() * norm_b.sqrt())
    }
}

/// Great-circle distance in kilometers, Earth radius 6371 km.
pub fn haversine_distance_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    const EARTH_RADIUS_KM: f64 = 6371.0;

    let (lat1, lon1, lat2, lon2) = (
        lat1.to_radians(),
        lon1.to_radians(),
        lat2.to_radians(),
        lon2.to_radians(),
    );
    let dlat = lat2 - lat1;
    let dlon = lon2 - lon1;

    let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * a.sqrt().asin()
}

/// Nearest-rank percentile over an unsorted sample: the element at
/// `round(q * (n - 1))` of the sorted values. `q` in [0, 1].
pub fn percentile(values: &[f64], q: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let idx = (q * (sorted.len() - 1) as f64).round() as usize;
    Some(sorted[idx.min(sorted.len() - 1)])
}

/// Divide every weight by the map's max so the strongest key sits at 1.0.
pub fn max_normalize<K: Eq + Hash>(map: &mut HashMap<K, f64>) {
    let max = map.values().cloned().fold(f64::MIN, f64::max);
    if max > 0.0 {
        for value in map.values_mut() {
            *value /= max;
        }
    }
}

/// Jaccard index of two sets; 0 if either is empty.
pub fn jaccard<K: Eq + Hash>(a: &HashSet<K>, b: &HashSet<K>) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.union(b).count();
    if union == 0 {
        0.0
    } else {
        intersection as f64 / union as f64
    }
}

/// Pulls the first run of digits (commas allowed) out of a free-text fee
/// field. Returns None when the text carries no figure at all.
pub fn parse_fee(text: &str) -> Option<f64> {
    let mut digits = String::new();
    let mut started = false;
    for c in text.chars() {
        if c.is_ascii_digit() {
            digits.push(c);
            started = true;
        } else if c == ',' && started {
            continue;
        } else if started {
            break;
        }
    }
    if digits.is_empty() {
        None
    } else {
        digits.parse::<f64>().ok()
    }
}

/// Sort (id, score) pairs by score descending and keep the top k.
pub fn top_k_by_score<T>(mut scored: Vec<(T, f64)>, k: usize) -> Vec<(T, f64)> {
    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(k);
    scored
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_similarity_map() {
        let mut a = HashMap::new();
        a.insert("x", 1.0);
        let mut b = HashMap::new();
        b.insert("y", 1.0);
        assert_eq!(cosine_similarity_map(&a, &b), 0.0);

        let mut c = HashMap::new();
        c.insert("x", 2.0);
        assert!((cosine_similarity_map(&a, &c) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_haversine_zero_distance() {
        let d = haversine_distance_km(37.5, 127.0, 37.5, 127.0);
        assert!(d.abs() < 1e-9);
    }

    #[test]
    fn test_haversine_known_distance() {
        // One degree of latitude is roughly 111 km.
        let d = haversine_distance_km(37.0, 127.0, 38.0, 127.0);
        assert!((d - 111.19).abs() < 1.0);
    }

    #[test]
    fn test_percentile_banding() {
        let fees = vec![80_000.0, 90_000.0, 150_000.0, 400_000.0];
        assert_eq!(percentile(&fees, 0.25), Some(90_000.0));
        assert_eq!(percentile(&fees, 0.75), Some(150_000.0));
        assert_eq!(percentile(&[], 0.5), None);
    }

    #[test]
    fn test_max_normalize() {
        let mut map = HashMap::new();
        map.insert("a", 2.0);
        map.insert("b", 4.0);
        max_normalize(&mut map);
        assert_eq!(map["a"], 0.5);
        assert_eq!(map["b"], 1.0);
    }

    #[test]
    fn test_jaccard() {
        let a: HashSet<u32> = [1, 2, 3].into_iter().collect();
        let b: HashSet<u32> = [2, 3, 4].into_iter().collect();
        assert!((jaccard(&a, &b) - 0.5).abs() < 1e-9);
        assert_eq!(jaccard(&a, &HashSet::new()), 0.0);
    }

    #[test]
    fn test_parse_fee() {
        assert_eq!(parse_fee("250,000 per month"), Some(250000.0));
        assert_eq!(parse_fee("from 90000"), Some(90000.0));
        assert_eq!(parse_fee("call for pricing"), None);
        assert_eq!(parse_fee(""), None);
    }

    #[test]
    fn test_top_k_by_score() {
        let scored = vec![("a", 0.1), ("b", 0.9), ("c", 0.5)];
        let top = top_k_by_score(scored, 2);
        assert_eq!(top[0].0, "b");
        assert_eq!(top[1].0, "c");
    }
}
