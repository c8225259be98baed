use ipmerge_data_format::Value;
use ipmerge_ip_trie::merge::Replace;
use ipmerge_ip_trie::{IpTrie, IpVersion, Network};
use proptest::prelude::*;
use std::net::{IpAddr, Ipv4Addr};

fn arb_network() -> impl Strategy<Value = (u32, u8)> {
    (any::<u32>(), 0u8..=32)
}

/// Last insert covering `addr` wins
fn expected(inserts: &[((u32, u8), u32)], addr: Ipv4Addr) -> Option<u32> {
    inserts
        .iter()
        .rev()
        .find(|((base, len), _)| {
            let net = Network::from_ipv4(Ipv4Addr::from(*base), *len).unwrap();
            net.contains(IpAddr::V4(addr))
        })
        .map(|(_, v)| *v)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn replace_matches_last_writer_model(
        inserts in prop::collection::vec((arb_network(), 0u32..4), 1..12),
        probes in prop::collection::vec(any::<u32>(), 1..32),
    ) {
        let mut trie = IpTrie::new(IpVersion::V6);
        trie.enable_ipv4_aliasing();
        for ((base, len), v) in &inserts {
            let net = Network::from_ipv4(Ipv4Addr::from(*base), *len).unwrap();
            trie.insert(&net, &Replace(Value::Uint32(*v))).unwrap();
        }

        // probe the inserted base addresses too, they sit on region edges
        let addrs = probes.iter().copied().chain(inserts.iter().map(|((b, _), _)| *b));
        for raw in addrs {
            let addr = Ipv4Addr::from(raw);
            let got = trie.lookup(IpAddr::V4(addr)).map(|m| match **m.value {
                Value::Uint32(v) => v,
                ref other => panic!("unexpected {:?}", other),
            });
            prop_assert_eq!(got, expected(&inserts, addr));

            let mapped = trie.lookup(IpAddr::V6(addr.to_ipv6_mapped())).map(|m| (**m.value).clone());
            prop_assert_eq!(mapped, got.map(Value::Uint32));
        }
    }

    #[test]
    fn networks_are_disjoint_and_cover_lookups(
        inserts in prop::collection::vec((arb_network(), 0u32..3), 1..10),
    ) {
        let mut trie = IpTrie::new(IpVersion::V4);
        for ((base, len), v) in &inserts {
            let net = Network::from_ipv4(Ipv4Addr::from(*base), *len).unwrap();
            trie.insert(&net, &Replace(Value::Uint32(*v))).unwrap();
        }

        let networks: Vec<Network> = trie.networks().map(|(n, _)| n).collect();
        for (i, a) in networks.iter().enumerate() {
            for b in &networks[i + 1..] {
                prop_assert!(!a.contains(b.addr()) && !b.contains(a.addr()));
            }
        }
        for (net, value) in trie.networks() {
            let hit = trie.lookup(net.addr()).unwrap();
            prop_assert_eq!(hit.value, value);
            prop_assert_eq!(hit.prefix_len, net.prefix_len());
        }
    }
}
