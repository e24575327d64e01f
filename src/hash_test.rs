use super::*;

#[test]
fn test_positions_range_and_count() {
    for (m, h) in [(1, 1), (16, 2), (17, 3), (1024, 7)].iter() {
        let ps: Vec<u64> = positions(b"ACGTACGT", *m, *h).collect();
        assert_eq!(ps.len(), *h as usize);
        assert!(ps.iter().all(|p| p < m), "{:?} m {}", ps, m);
    }
}

#[test]
fn test_positions_deterministic() {
    let a: Vec<u64> = positions(b"ACG", 1_000_003, 3).collect();
    let b: Vec<u64> = positions(b"ACG", 1_000_003, 3).collect();
    assert_eq!(a, b);

    // distinct keys land on distinct position sets for a wide filter.
    let c: Vec<u64> = positions(b"CGT", 1_000_003, 3).collect();
    assert_ne!(a, c);
}

#[test]
fn test_positions_double_hashing() {
    // consecutive positions differ by a constant stride modulo m.
    let m = 1 << 20;
    let ps: Vec<u64> = positions(b"GATTACA", m, 5).collect();
    let stride = (m + ps[1] - ps[0]) % m;
    for w in ps.windows(2) {
        assert_eq!((m + w[1] - w[0]) % m, stride);
    }
}

#[test]
fn test_positions_m_one() {
    // m = 1 collapses every position to zero.
    let ps: Vec<u64> = positions(b"TTTT", 1, 4).collect();
    assert_eq!(ps, vec![0, 0, 0, 0]);
}
