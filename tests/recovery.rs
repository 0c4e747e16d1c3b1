use once_cell::sync::Lazy;
use rug::Integer;

use rsacc::accumulator::{aggregate_witnesses, verify_aggregated, verify_membership};
use rsacc::checkpoint::{recover, JsonDirStore, MemoryStore, SqliteStore};
use rsacc::hash_to_prime::NoncePolicy;
use rsacc::parallel::Executor;
use rsacc::primitives::Parameters;
use rsacc::util::padded_hex;
use rsacc::{AccumulatorState, CheckpointStore, Config, ElementId, Error, Session};

static PARAMS: Lazy<Parameters> = Lazy::new(|| Parameters::generate(256, None).unwrap());

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn elements(n: usize) -> Vec<ElementId> {
    (0..n)
        .map(|i| ElementId::new(&format!("0x{:064x}", 1000 + i)).unwrap())
        .collect()
}

fn config(policy: NoncePolicy) -> Config {
    Config {
        modulus_bits: 256,
        batch_size: 4,
        checkpoint_interval: 2,
        nonce_policy: policy,
        ..Config::default()
    }
}

/// Accumulate, delete, finish; then recover in a fresh session from the same store.
fn accumulate_delete_recover<S: CheckpointStore>(store: S, reopen: impl FnOnce(S) -> S) {
    init_logging();
    let xs = elements(18);
    let config = config(NoncePolicy::Random);

    let mut session = Session::new(PARAMS.clone(), &config, store).unwrap();
    assert_eq!(session.process_all(&xs).unwrap(), 18);
    assert!(session.verify_history().unwrap());
    let removed = session.delete(&xs[3..6]).unwrap();
    assert_eq!(removed.len(), 3);
    let last = session.finish().unwrap();
    assert_eq!(last, 6);

    let value = session.state().value().clone();
    let store = reopen(session.into_store());
    assert_eq!(store.indices().unwrap(), vec![2, 4, 6]);

    let mut resumed = Session::resume(&config, store, None).unwrap();
    assert_eq!(resumed.state().value(), &value);
    assert_eq!(resumed.state().members().len(), 15);
    for x in &xs[6..] {
        let proof = resumed.prove(x).unwrap();
        assert!(proof.verify(&value, PARAMS.modulus()).unwrap());
    }
    assert!(matches!(resumed.prove(&xs[4]), Err(Error::UnknownElement(_))));

    // An older checkpoint still recovers to its own value.
    let older = resumed.store().load(4).unwrap();
    let state = recover(&PARAMS, &older, NoncePolicy::Random, &Executor::default()).unwrap();
    assert_eq!(state.value(), &older.accumulator);
    assert_eq!(state.members().len(), 16);
}

#[test]
fn test_memory_store_flow() {
    accumulate_delete_recover(MemoryStore::new(), |store| store);
}

#[test]
fn test_json_store_flow() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("checkpoints");
    accumulate_delete_recover(JsonDirStore::open(&path).unwrap(), |_| {
        JsonDirStore::open(&path).unwrap()
    });
}

#[test]
fn test_sqlite_store_flow() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("checkpoints.sqlite");
    accumulate_delete_recover(SqliteStore::open(&path).unwrap(), |store| {
        drop(store);
        SqliteStore::open(&path).unwrap()
    });
}

#[test]
fn test_wrong_parameters_detected() {
    init_logging();
    let mut store = MemoryStore::new();
    let config = config(NoncePolicy::Zero);
    let mut session = Session::new(PARAMS.clone(), &config, MemoryStore::new()).unwrap();
    session.process_all(&elements(5)).unwrap();
    session.finish().unwrap();
    let checkpoint = session.store().load(2).unwrap();

    let other = Parameters::new(
        PARAMS.modulus().clone(),
        Integer::from(PARAMS.initial_value() + 1) % PARAMS.modulus(),
    )
    .unwrap();
    store.save_parameters(&other).unwrap();
    store.save(&checkpoint).unwrap();
    let err = Session::resume(&config, store, None).err().unwrap();
    assert!(matches!(err, Error::CheckpointIntegrity { batch_index: 2 }));
}

#[test]
fn test_resume_older_checkpoint_on_disk() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("checkpoints");
    let xs = elements(20);
    let config = config(NoncePolicy::Random);

    let store = JsonDirStore::open(&path).unwrap();
    let mut session = Session::new(PARAMS.clone(), &config, store).unwrap();
    session.process_all(&xs[..16]).unwrap();
    drop(session);
    std::fs::write(path.join(".checkpoint_6.json.tmp"), "{").unwrap();

    let store = JsonDirStore::open(&path).unwrap();
    assert_eq!(store.indices().unwrap(), vec![2, 4]);
    let mut forked = Session::resume(&config, store, Some(2)).unwrap();
    assert_eq!(forked.state().members().len(), 8);
    forked.process_all(&xs[16..]).unwrap();
    assert_eq!(forked.finish().unwrap(), 5);
    assert!(forked.verify_witnesses().unwrap().is_empty());

    let store = forked.into_store();
    assert_eq!(store.indices().unwrap(), vec![2, 4, 5]);
    assert_eq!(store.load(4).unwrap().elements.len(), 16);
    assert_eq!(store.load(5).unwrap().elements.len(), 12);

    let other = Parameters::new(
        PARAMS.modulus().clone(),
        Integer::from(PARAMS.initial_value() + 1) % PARAMS.modulus(),
    )
    .unwrap();
    assert!(matches!(
        Session::new(other, &config, store),
        Err(Error::ParametersMismatch)
    ));
    let reopened = JsonDirStore::open(&path).unwrap();
    assert_eq!(reopened.load_parameters().unwrap(), *PARAMS);
}

/// n = 61 * 53, A0 = 2; members with primes 7, 11 and 13 stand in for hashed elements.
#[test]
fn test_toy_accumulator() {
    let n = Integer::from(3233);
    let g = Integer::from(2);
    let primes: Vec<Integer> = vec![7.into(), 11.into(), 13.into()];
    let a1 = Integer::from(g.pow_mod_ref(&Integer::from(1001), &n).unwrap());
    let witnesses =
        rsacc::accumulator::root_factor(&g, &primes, &n, &Executor::default()).unwrap();
    assert_eq!(witnesses[0], Integer::from(g.pow_mod_ref(&Integer::from(143), &n).unwrap()));
    for (w, p) in witnesses.iter().zip(&primes) {
        assert_eq!(Integer::from(w.pow_mod_ref(p, &n).unwrap()), a1);
    }
    assert_eq!(padded_hex(&n, 2), "0x0ca1");
}

#[test]
fn test_aggregated_proof() {
    let executor = Executor::default();
    let mut acc = AccumulatorState::new(PARAMS.clone(), NoncePolicy::Zero);
    let xs = elements(6);
    acc.batch_add(&xs, &executor).unwrap();
    let witnesses = acc.witnesses(&executor).unwrap();

    let proofs: Vec<_> = xs
        .iter()
        .map(|x| rsacc::MembershipProof {
            element: x.clone(),
            nonce: acc.members().nonce(x).unwrap(),
            witness: witnesses.get(x).unwrap().clone(),
        })
        .collect();
    for proof in &proofs {
        assert!(verify_membership(
            acc.value(),
            &proof.element,
            proof.nonce,
            &proof.witness,
            acc.modulus()
        )
        .unwrap());
    }
    let aggregated = aggregate_witnesses(&proofs, acc.modulus()).unwrap();
    let members: Vec<_> = proofs.iter().map(|p| (p.element.clone(), p.nonce)).collect();
    assert!(verify_aggregated(acc.value(), &members, &aggregated, acc.modulus()).unwrap());
    // Every member aggregated: the witness is A0 itself.
    assert_eq!(&aggregated, PARAMS.initial_value());
}
