//! Eight one-byte leaves `a..h` hashed with SHA-256.
#![allow(unused_crate_dependencies)]

use strata_batch_merkle::codec::{decode_buf_exact, encode_to_vec};
use strata_batch_merkle::prelude::*;
use strata_batch_merkle::{BatchPath, MerkleError};

type H = [u8; 32];

const ELEMENTS: &[u8; 8] = b"abcdefgh";

struct Fixture {
    hasher: Sha256Hasher,
    tree: MerkleTree<H>,
    h12: H,
    h34: H,
    h56: H,
    h1234: H,
    h5678: H,
}

fn fixture() -> Fixture {
    let hasher = Sha256Hasher::new();
    let tree = MerkleTree::from_values(ELEMENTS.chunks(1), &hasher).unwrap();

    let h12 = hasher.digest(b"ab");
    let h34 = hasher.digest(b"cd");
    let h56 = hasher.digest(b"ef");
    let h78 = hasher.digest(b"gh");

    Fixture {
        h1234: hasher.merge(&h12, &h34),
        h5678: hasher.merge(&h56, &h78),
        hasher,
        tree,
        h12,
        h34,
        h56,
    }
}

fn leaf(i: usize) -> Vec<u8> {
    vec![ELEMENTS[i]]
}

#[test]
fn builds_expected_root() {
    let f = fixture();
    assert_eq!(f.tree.depth(), 3);
    assert_eq!(f.tree.leaf_count(), 8);
    assert_eq!(f.tree.root(), &f.hasher.merge(&f.h1234, &f.h5678));
    assert_eq!(
        hex::encode(f.h12),
        "fb8e20fc2e4c3f248c60c39bd652f3c1347298bb977b8b4d5903b85055620603"
    );
}

#[test]
fn single_proofs() {
    let f = fixture();
    let cases = [
        (0, 1, f.h34, f.h5678),
        (1, 0, f.h34, f.h5678),
        (3, 2, f.h12, f.h5678),
        (6, 7, f.h56, f.h1234),
        (7, 6, f.h56, f.h1234),
    ];

    for (index, sibling, c1, c2) in cases {
        let proof = f.tree.prove(index).unwrap();
        assert_eq!(
            proof.entries(),
            vec![leaf(index), leaf(sibling), c1.to_vec(), c2.to_vec()],
            "index {index}"
        );
        assert!(verify(f.tree.root(), index, &proof, &f.hasher), "index {index}");
    }
}

#[test]
fn single_proof_errors() {
    let f = fixture();
    for index in [8, 20, 1000] {
        assert_eq!(f.tree.prove(index).unwrap_err(), MerkleError::InvalidIndex(index));
    }
}

#[test]
fn single_proof_wrong_index() {
    let f = fixture();
    for (index, wrong) in [(0, 1), (6, 7), (1, 8), (1, usize::MAX)] {
        let proof = f.tree.prove(index).unwrap();
        assert!(!verify(f.tree.root(), wrong, &proof, &f.hasher), "{index} as {wrong}");
    }
}

#[test]
fn batch_proofs() {
    let f = fixture();
    let c = leaf(2);
    let g = leaf(6);
    let cases: Vec<(Vec<usize>, Vec<Vec<Vec<u8>>>)> = vec![
        (vec![3], vec![vec![c.clone(), f.h12.to_vec(), f.h5678.to_vec()]]),
        (vec![0, 1], vec![vec![f.h34.to_vec(), f.h5678.to_vec()]]),
        (vec![0, 1, 7], vec![vec![f.h34.to_vec()], vec![g, f.h56.to_vec()]]),
        (vec![0, 1, 6, 7], vec![vec![f.h34.to_vec()], vec![f.h56.to_vec()]]),
        (vec![0, 1, 6, 7, 3], vec![vec![], vec![c], vec![f.h56.to_vec()]]),
        (vec![0, 1, 2, 3, 6, 7], vec![vec![], vec![], vec![f.h56.to_vec()]]),
        (vec![0, 1, 6, 7, 4, 5, 2, 3], vec![vec![], vec![], vec![], vec![]]),
    ];

    for (indexes, nodes) in cases {
        let proof = f.tree.prove_batch(&indexes).unwrap();
        assert_eq!(proof.depth(), 3);
        for (pos, &index) in indexes.iter().enumerate() {
            assert_eq!(proof.values()[pos], leaf(index), "{indexes:?}");
        }

        let got: Vec<_> = proof.paths().iter().map(BatchPath::entries).collect();
        assert_eq!(got, nodes, "{indexes:?}");
        assert!(verify_batch(f.tree.root(), &indexes, &proof, &f.hasher), "{indexes:?}");

        let decoded: BatchMerkleProof<H> = decode_buf_exact(&encode_to_vec(&proof).unwrap()).unwrap();
        assert_eq!(decoded, proof);
    }
}

#[test]
fn batch_proof_errors() {
    let f = fixture();
    let cases: [(&[usize], MerkleError); 5] = [
        (&[8], MerkleError::InvalidIndex(8)),
        (&[0, 8], MerkleError::InvalidIndex(8)),
        (&[8, 0, 1], MerkleError::InvalidIndex(8)),
        (&[0, 10, 1], MerkleError::InvalidIndex(10)),
        (&[0, 3, 0], MerkleError::DuplicateIndex(0)),
    ];
    for (indexes, err) in cases {
        assert_eq!(f.tree.prove_batch(indexes).unwrap_err(), err, "{indexes:?}");
    }
}

#[test]
fn batch_proof_wrong_indexes() {
    let f = fixture();
    let cases: [(&[usize], &[usize]); 8] = [
        (&[3], &[]),
        (&[3], &[2]),
        (&[0, 1], &[1]),
        (&[0, 1, 7], &[0, 7, 1]),
        (&[0, 1, 6, 7], &[0, 1, 2]),
        (&[0, 1, 6, 7, 3], &[0, 1, 7, 3]),
        (&[0, 1, 2, 3, 6, 7], &[2, 3, 6, 7]),
        (&[0, 1, 6, 7, 4, 5, 2, 3], &[1, 2, 3, 4]),
    ];

    for (indexes, wrong) in cases {
        let proof = f.tree.prove_batch(indexes).unwrap();
        assert!(
            !verify_batch(f.tree.root(), wrong, &proof, &f.hasher),
            "{indexes:?} as {wrong:?}"
        );
    }
}

#[test]
fn algorithms_disagree() {
    let f = fixture();
    let blake = create_hash(HashAlgorithm::Blake2s256, &HashOptions::new()).unwrap();
    let tree = MerkleTree::from_values(ELEMENTS.chunks(1), &blake).unwrap();
    assert_ne!(tree.root(), f.tree.root());

    let proof = tree.prove(2).unwrap();
    assert!(verify(tree.root(), 2, &proof, &blake));
    assert!(!verify(tree.root(), 2, &proof, &f.hasher));
}
