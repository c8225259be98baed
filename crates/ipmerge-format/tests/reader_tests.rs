use ipmerge_data_format::{encode_canonical, Value};
use ipmerge_format::mmdb::METADATA_MARKER;
use ipmerge_format::{
    read_database, read_database_file, write_database, FormatError, Metadata, WriteOptions,
};
use ipmerge_ip_trie::merge::{Replace, TopLevelMerge};
use ipmerge_ip_trie::{IpTrie, IpVersion, Network, Node, RecordSize};
use std::io::Write;

fn net(s: &str) -> Network {
    s.parse().unwrap()
}

fn to_bytes(trie: &IpTrie, options: &WriteOptions) -> Vec<u8> {
    let mut out = Vec::new();
    write_database(trie, options, &mut out).unwrap();
    out
}

/// Hand-assemble a file from raw 24-bit nodes and a data section
fn assemble(nodes: &[(u32, u32)], data: &[u8], metadata: &Metadata) -> Vec<u8> {
    let mut out = Vec::new();
    for &(l, r) in nodes {
        RecordSize::Bits24.write_node(&mut out, l, r);
    }
    out.extend_from_slice(&[0u8; 16]);
    out.extend_from_slice(data);
    out.extend_from_slice(METADATA_MARKER);
    out.extend_from_slice(&encode_canonical(&metadata.to_value()).unwrap());
    out
}

fn v4_metadata(node_count: u32) -> Metadata {
    let mut metadata = Metadata::new(IpVersion::V4, "Test");
    metadata.node_count = node_count;
    metadata.record_size = RecordSize::Bits24;
    metadata
}

#[test]
fn test_round_trip_preserves_lookups_and_metadata() {
    let mut trie = IpTrie::new(IpVersion::V6);
    trie.enable_ipv4_aliasing();
    trie.insert(&net("56.0.0.0/16"), &Replace(Value::map([("dept", "SRE")])))
        .unwrap();
    trie.insert(&net("2001:db8::/32"), &Replace(Value::Uint128(u128::MAX)))
        .unwrap();
    trie.insert(
        &net("56.0.1.0/24"),
        &TopLevelMerge::new(Value::map([("env", Value::slice(["staging"]))])),
    )
    .unwrap();

    let mut options = WriteOptions {
        database_type: "Enriched".to_string(),
        languages: vec!["en".to_string()],
        build_epoch: 1_600_000_000,
        ..Default::default()
    };
    options
        .description
        .insert("en".to_string(), "round trip".to_string());

    let bytes = to_bytes(&trie, &options);
    let loaded = read_database(&bytes).unwrap();
    assert_eq!(loaded.metadata.database_type, "Enriched");
    assert_eq!(loaded.metadata.languages, vec!["en".to_string()]);
    assert_eq!(loaded.metadata.build_epoch, 1_600_000_000);
    assert_eq!(loaded.metadata.ip_version, IpVersion::V6);

    for addr in [
        "56.0.0.1",
        "56.0.1.1",
        "::ffff:56.0.1.1",
        "2002:3800:0101::",
        "2001:db8::5",
        "9.9.9.9",
        "2400::",
    ] {
        let addr = addr.parse().unwrap();
        assert_eq!(
            loaded.trie.lookup(addr).map(|m| (**m.value).clone()),
            trie.lookup(addr).map(|m| (**m.value).clone()),
            "{}",
            addr
        );
    }

    let original: Vec<String> = trie.networks().map(|(n, _)| n.to_string()).collect();
    let reloaded: Vec<String> = loaded.trie.networks().map(|(n, _)| n.to_string()).collect();
    assert_eq!(original, reloaded);
}

#[test]
fn test_rewrite_is_byte_identical() {
    let mut trie = IpTrie::new(IpVersion::V6);
    trie.enable_ipv4_aliasing();
    for (i, cidr) in ["10.0.0.0/8", "10.1.0.0/16", "fd00::/8"].iter().enumerate() {
        trie.insert(&net(cidr), &Replace(Value::map([("n", i as u32)])))
            .unwrap();
    }
    let first = to_bytes(&trie, &WriteOptions::default());
    let loaded = read_database(&first).unwrap();
    let second = to_bytes(&loaded.trie, &WriteOptions::default());
    assert_eq!(first, second);
}

#[test]
fn test_loaded_aliases_are_aliases() {
    let mut trie = IpTrie::new(IpVersion::V6);
    trie.enable_ipv4_aliasing();
    trie.insert(&net("1.0.0.0/8"), &Replace(Value::from("x")))
        .unwrap();
    let loaded = read_database(&to_bytes(&trie, &WriteOptions::default())).unwrap();

    let mut aliases = 0;
    let mut stack = vec![loaded.trie.root()];
    while let Some(id) = stack.pop() {
        match loaded.trie.node(id) {
            Node::Internal { left, right } => {
                stack.push(*left);
                stack.push(*right);
            }
            Node::Alias(_) => aliases += 1,
            _ => {}
        }
    }
    assert_eq!(aliases, 3);
}

#[test]
fn test_region_root_round_trip() {
    let mut trie = IpTrie::new(IpVersion::V4);
    trie.insert(&net("0.0.0.0/0"), &Replace(Value::Bool(true)))
        .unwrap();
    let loaded = read_database(&to_bytes(&trie, &WriteOptions::default())).unwrap();
    assert_eq!(loaded.metadata.node_count, 1);
    let hit = loaded.trie.lookup("1.2.3.4".parse().unwrap()).unwrap();
    assert_eq!(hit.prefix_len, 0);
}

#[test]
fn test_read_from_file() {
    let mut trie = IpTrie::new(IpVersion::V4);
    trie.insert(&net("192.0.2.0/24"), &Replace(Value::from("doc")))
        .unwrap();
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(&to_bytes(&trie, &WriteOptions::default()))
        .unwrap();
    file.flush().unwrap();

    let loaded = read_database_file(file.path()).unwrap();
    assert!(loaded.trie.lookup("192.0.2.1".parse().unwrap()).is_some());
}

#[test]
fn test_missing_file_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    assert!(matches!(
        read_database_file(dir.path().join("missing.mmdb")),
        Err(FormatError::Io {
            kind: std::io::ErrorKind::NotFound,
            ..
        })
    ));
}

#[test]
fn test_empty_file_is_corrupt() {
    let file = tempfile::NamedTempFile::new().unwrap();
    assert!(matches!(
        read_database_file(file.path()),
        Err(FormatError::CorruptDatabase(_))
    ));
}

#[test]
fn test_truncated_marker_is_corrupt() {
    let trie = IpTrie::new(IpVersion::V4);
    let bytes = to_bytes(&trie, &WriteOptions::default());
    // one node, separator, no data, then half the marker
    let truncated = &bytes[..6 + 16 + METADATA_MARKER.len() / 2];
    assert!(matches!(
        read_database(truncated),
        Err(FormatError::CorruptDatabase(_))
    ));
}

#[test]
fn test_unsupported_major_version() {
    let mut metadata = v4_metadata(1);
    metadata.binary_format_major_version = 3;
    let bytes = assemble(&[(1, 1)], &[], &metadata);
    assert!(matches!(
        read_database(&bytes),
        Err(FormatError::UnsupportedFormatVersion { major: 3, .. })
    ));
}

#[test]
fn test_cycle_is_corrupt() {
    let bytes = assemble(&[(1, 2), (0, 2)], &[], &v4_metadata(2));
    assert!(matches!(
        read_database(&bytes),
        Err(FormatError::CorruptDatabase(_))
    ));
}

#[test]
fn test_orphan_is_corrupt() {
    let bytes = assemble(&[(2, 2), (2, 2)], &[], &v4_metadata(2));
    assert!(matches!(
        read_database(&bytes),
        Err(FormatError::CorruptDatabase(_))
    ));
}

#[test]
fn test_data_pointer_past_end_is_corrupt() {
    let data = encode_canonical(&Value::from("ok")).unwrap();
    let bytes = assemble(&[(1 + 16 + 50, 1)], &data, &v4_metadata(1));
    assert!(matches!(
        read_database(&bytes),
        Err(FormatError::CorruptDatabase(_))
    ));
}

#[test]
fn test_self_referencing_data_pointer_is_corrupt() {
    // pointer at offset 0 pointing to offset 0
    let data = vec![0x20, 0x00];
    let bytes = assemble(&[(1 + 16, 1)], &data, &v4_metadata(1));
    assert!(matches!(
        read_database(&bytes),
        Err(FormatError::CorruptDatabase(_))
    ));
}

#[test]
fn test_tree_larger_than_file_is_corrupt() {
    let bytes = assemble(&[(1, 1)], &[], &v4_metadata(500));
    assert!(matches!(
        read_database(&bytes),
        Err(FormatError::CorruptDatabase(_))
    ));
}

#[test]
fn test_shared_data_decoded_once() {
    let data = encode_canonical(&Value::map([("a", "b")])).unwrap();
    // node 0 -> (node 1, data 0); node 1 -> (data 0, empty)
    let bytes = assemble(&[(1, 2 + 16), (2 + 16, 2)], &data, &v4_metadata(2));
    let loaded = read_database(&bytes).unwrap();
    let low = loaded.trie.lookup("1.0.0.0".parse().unwrap()).unwrap();
    let high = loaded.trie.lookup("200.0.0.0".parse().unwrap()).unwrap();
    assert!(std::sync::Arc::ptr_eq(low.value, high.value));
    assert!(loaded.trie.lookup("64.0.0.0".parse().unwrap()).is_none());
}
