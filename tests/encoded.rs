// tests/encoded.rs
use anyhow::Result;
use ironbeam_cogroup::record::encode_batch;
use ironbeam_cogroup::testing::assert_cogroup_eq;
use ironbeam_cogroup::*;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

fn modulo(n: usize) -> Result<Arc<dyn Partitioner<u32>>> {
    Ok(Arc::new(ModuloPartitioner::<u32>::new(n)?))
}

fn encoded_input(encoding: Encoding, pairs: &[(u32, String)]) -> Result<Vec<Record<u32, String>>> {
    let records = encode_batch(encoding, pairs.iter().map(|(k, v)| (k, v)))?;
    Ok(records.into_iter().map(Record::Encoded).collect())
}

#[test]
fn batch_records_share_one_buffer() -> Result<()> {
    let pairs = vec![(1u32, "a".to_string()), (2, "b".to_string()), (3, "c".to_string())];
    let records = encode_batch(Encoding::Postcard, pairs.iter().map(|(k, v)| (k, v)))?;
    assert_eq!(records.len(), 3);
    assert!(records.iter().all(|r| r.buffer_refs() == 3));
    assert!(records.iter().all(|r| r.key_type().is::<u32>()));
    Ok(())
}

#[test]
fn encoded_narrow_records_are_decoded_and_copied() -> Result<()> {
    let pairs = vec![(1u32, "a".to_string()), (3, "c".to_string()), (1, "b".to_string())];
    let mut parts = vec![Vec::new(), encoded_input(Encoding::Json, &pairs)?];
    // Mixed partitions: typed and encoded records side by side.
    parts[0].push(Record::Decoded(2, "z".to_string()));
    let input = MemoryDataset::from_records(parts).with_partitioner(modulo(2)?);
    let other = MemoryDataset::from_vec(vec![(3u32, "o".to_string())], 1);

    let inputs: Vec<Arc<dyn KeyedDataset<u32, String>>> = vec![Arc::new(input), Arc::new(other)];
    let op = CoGroupedDataset::new(inputs, modulo(2)?, CoGroupEnv::local(Arc::new(LocalShuffleService::default())))?;
    assert!(op.dependencies()?[0].is_narrow());

    assert_cogroup_eq(
        Runner::default().collect(&op)?,
        vec![
            (1, vec![vec!["a".to_string(), "b".to_string()], vec![]]),
            (2, vec![vec!["z".to_string()], vec![]]),
            (3, vec![vec!["c".to_string()], vec!["o".to_string()]]),
        ],
    );
    Ok(())
}

#[test]
fn encoded_records_survive_the_shuffle() -> Result<()> {
    let pairs = vec![(4u32, "x".to_string()), (5, "y".to_string())];
    let input = MemoryDataset::from_records(vec![encoded_input(Encoding::Postcard, &pairs)?]);
    let inputs: Vec<Arc<dyn KeyedDataset<u32, String>>> = vec![Arc::new(input)];
    let op = CoGroupedDataset::new(inputs, modulo(2)?, CoGroupEnv::local(Arc::new(LocalShuffleService::new(Encoding::Json))))?;
    assert_eq!(op.engine().serializer(), "json");
    assert!(!op.dependencies()?[0].is_narrow());

    assert_cogroup_eq(
        Runner::default().collect(&op)?,
        vec![(4, vec![vec!["x".to_string()]]), (5, vec![vec!["y".to_string()]])],
    );
    Ok(())
}

/// Counts the records it decodes and tags every value.
struct TaggingAdapter {
    decoded: AtomicUsize,
}

impl KeyAdapter<u32, String> for TaggingAdapter {
    fn supports(&self, encoding: Encoding) -> bool {
        encoding == Encoding::Json
    }

    fn decode(&self, record: &EncodedRecord) -> ironbeam_cogroup::Result<(u32, String)> {
        self.decoded.fetch_add(1, Ordering::Relaxed);
        let key: u32 = record.encoding().decode(record.key_bytes())?;
        let value: String = record.encoding().decode(record.value_bytes())?;
        Ok((key, format!("json:{value}")))
    }
}

#[test]
fn registered_adapter_takes_precedence_for_its_encoding() -> Result<()> {
    let adapter = Arc::new(TaggingAdapter {
        decoded: AtomicUsize::new(0),
    });
    let decoder: RecordDecoder<u32, String> = RecordDecoder::default().with_adapter(adapter.clone());

    let mut records = encoded_input(Encoding::Json, &[(1, "a".to_string())])?;
    records.extend(encoded_input(Encoding::Postcard, &[(1, "b".to_string())])?);
    let input = MemoryDataset::from_records(vec![records]).with_partitioner(modulo(1)?);

    let inputs: Vec<Arc<dyn KeyedDataset<u32, String>>> = vec![Arc::new(input)];
    let env = CoGroupEnv::local(Arc::new(LocalShuffleService::default())).with_decoder(decoder);
    let op = CoGroupedDataset::new(inputs, modulo(1)?, env)?;

    assert_cogroup_eq(
        Runner::new(ExecMode::Sequential).collect(&op)?,
        vec![(1, vec![vec!["json:a".to_string(), "b".to_string()]])],
    );
    assert_eq!(adapter.decoded.load(Ordering::Relaxed), 1);
    Ok(())
}

#[test]
fn corrupt_value_bytes_fail_decoding() -> Result<()> {
    let buffer: Arc<[u8]> = Arc::from(&b"1{not json"[..]);
    let rec = EncodedRecord::in_buffer(Encoding::Json, TypeTag::of::<u32>(), buffer, 0..1, 1..10)?;
    let input = MemoryDataset::<u32, String>::from_records(vec![vec![Record::Encoded(rec)]]).with_partitioner(modulo(1)?);
    let inputs: Vec<Arc<dyn KeyedDataset<u32, String>>> = vec![Arc::new(input)];
    let op = CoGroupedDataset::new(inputs, modulo(1)?, CoGroupEnv::local(Arc::new(LocalShuffleService::default())))?;

    assert!(matches!(
        op.compute(0, &TaskContext::new(0)),
        Err(CoGroupError::Decode { encoding: "json", .. })
    ));
    Ok(())
}

#[test]
fn out_of_range_spans_are_rejected() {
    let buffer: Arc<[u8]> = Arc::from(&b"12"[..]);
    let rec = EncodedRecord::in_buffer(Encoding::Json, TypeTag::of::<u32>(), buffer, 0..1, 1..5);
    assert!(rec.is_err());
}
