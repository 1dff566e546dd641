use crate::value::Value;

///
/// MurmurHash3 (x64, 128-bit variant, low 64 bits)
///
/// This is the only hash persisted anywhere in the system: plan fingerprints,
/// HyperLogLog bucket selection, and any future content-addressed key all
/// route through here. Determinism across platforms and compiler versions is
/// the entire point, so this is a from-scratch, dependency-free
/// implementation rather than a wrapper over the host's `Hash` derive (which
/// is explicitly *not* guaranteed stable across Rust versions).
///
/// Reference: Austin Appleby's MurmurHash3, x64_128 variant, seed = 0.
///

const C1: u64 = 0x87c3_7b91_1142_53d5;
const C2: u64 = 0x4cf5_ad43_2745_937f;

#[must_use]
pub fn murmur3_64(bytes: &[u8]) -> u64 {
    let (h1, _h2) = murmur3_x64_128(bytes, 0);
    h1
}

fn murmur3_x64_128(data: &[u8], seed: u64) -> (u64, u64) {
    let len = data.len();
    let nblocks = len / 16;

    let mut h1 = seed;
    let mut h2 = seed;

    for i in 0..nblocks {
        let base = i * 16;
        let mut k1 = u64::from_le_bytes(data[base..base + 8].try_into().unwrap());
        let mut k2 = u64::from_le_bytes(data[base + 8..base + 16].try_into().unwrap());

        k1 = k1.wrapping_mul(C1);
        k1 = k1.rotate_left(31);
        k1 = k1.wrapping_mul(C2);
        h1 ^= k1;

        h1 = h1.rotate_left(27);
        h1 = h1.wrapping_add(h2);
        h1 = h1.wrapping_mul(5).wrapping_add(0x52dc_e729);

        k2 = k2.wrapping_mul(C2);
        k2 = k2.rotate_left(33);
        k2 = k2.wrapping_mul(C1);
        h2 ^= k2;

        h2 = h2.rotate_left(31);
        h2 = h2.wrapping_add(h1);
        h2 = h2.wrapping_mul(5).wrapping_add(0x3849_5ab5);
    }

    let tail = &data[nblocks * 16..];
    let mut k1: u64 = 0;
    let mut k2: u64 = 0;

    if tail.len() > 8 {
        for (i, &b) in tail[8..].iter().enumerate().rev() {
            k2 ^= (b as u64) << (8 * i);
        }
        k2 = k2.wrapping_mul(C2);
        k2 = k2.rotate_left(33);
        k2 = k2.wrapping_mul(C1);
        h2 ^= k2;
    }
    if !tail.is_empty() {
        let head_len = tail.len().min(8);
        for (i, &b) in tail[..head_len].iter().enumerate().rev() {
            k1 ^= (b as u64) << (8 * i);
        }
        k1 = k1.wrapping_mul(C1);
        k1 = k1.rotate_left(31);
        k1 = k1.wrapping_mul(C2);
        h1 ^= k1;
    }

    h1 ^= len as u64;
    h2 ^= len as u64;

    h1 = h1.wrapping_add(h2);
    h2 = h2.wrapping_add(h1);

    h1 = fmix64(h1);
    h2 = fmix64(h2);

    h1 = h1.wrapping_add(h2);
    h2 = h2.wrapping_add(h1);

    (h1, h2)
}

const fn fmix64(mut k: u64) -> u64 {
    k ^= k >> 33;
    k = k.wrapping_mul(0xff51_afd7_ed55_8ccd);
    k ^= k >> 33;
    k = k.wrapping_mul(0xc4ce_b9fe_1a85_ec53);
    k ^= k >> 33;
    k
}

/// Canonicalize a `Value` into the type-tagged byte stream that
/// [`murmur3_64`] hashes. Arrays carry a length prefix followed by
/// per-element length prefixes so that e.g. `["ab", "c"]` and `["a", "bc"]`
/// never collide.
pub fn canonicalize_value(value: &Value, out: &mut Vec<u8>) {
    out.push(value.tag());
    match value {
        Value::Null => {}
        Value::Bool(b) => out.push(u8::from(*b)),
        Value::Int(i) => out.extend_from_slice(&i.to_le_bytes()),
        Value::Double(d) => out.extend_from_slice(&d.to_bits().to_le_bytes()),
        Value::String(s) => {
            out.extend_from_slice(&(s.len() as u64).to_le_bytes());
            out.extend_from_slice(s.as_bytes());
        }
        Value::Bytes(b) => {
            out.extend_from_slice(&(b.len() as u64).to_le_bytes());
            out.extend_from_slice(b);
        }
        Value::Array(items) => {
            out.extend_from_slice(&(items.len() as u64).to_le_bytes());
            for item in items {
                let start = out.len();
                canonicalize_value(item, out);
                let elem_len = (out.len() - start) as u64;
                // per-element length prefix, inserted before the element bytes
                let elem: Vec<u8> = out.split_off(start);
                out.extend_from_slice(&elem_len.to_le_bytes());
                out.extend_from_slice(&elem);
            }
        }
    }
}

/// Deterministic hash of a single `Value`.
#[must_use]
pub fn hash_value(value: &Value) -> u64 {
    let mut buf = Vec::new();
    canonicalize_value(value, &mut buf);
    murmur3_64(&buf)
}

/// Deterministic hash of a query plan's identity, per §4.2:
/// `hash(operator_description || sorted(index_names) || sort_fields)`.
#[must_use]
pub fn plan_fingerprint(
    operator_description: &str,
    index_names: &[&str],
    sort_fields: &[&str],
) -> u64 {
    let mut sorted_names: Vec<&str> = index_names.to_vec();
    sorted_names.sort_unstable();

    let mut buf = Vec::new();
    canonicalize_value(&Value::String(operator_description.to_string()), &mut buf);
    canonicalize_value(
        &Value::Array(sorted_names.iter().map(|s| Value::String((*s).to_string())).collect()),
        &mut buf,
    );
    canonicalize_value(
        &Value::Array(sort_fields.iter().map(|s| Value::String((*s).to_string())).collect()),
        &mut buf,
    );

    murmur3_64(&buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_is_deterministic() {
        assert_eq!(murmur3_64(b""), murmur3_64(b""));
    }

    #[test]
    fn differs_by_single_byte() {
        assert_ne!(murmur3_64(b"abc"), murmur3_64(b"abd"));
    }

    #[test]
    fn array_length_prefixes_prevent_collisions() {
        let a = Value::Array(vec![Value::String("ab".into()), Value::String("c".into())]);
        let b = Value::Array(vec![Value::String("a".into()), Value::String("bc".into())]);
        assert_ne!(hash_value(&a), hash_value(&b));
    }

    #[test]
    fn fingerprint_ignores_index_name_order() {
        let a = plan_fingerprint("IndexSeek(users_email)", &["b", "a"], &["created_at"]);
        let b = plan_fingerprint("IndexSeek(users_email)", &["a", "b"], &["created_at"]);
        assert_eq!(a, b);
    }

    #[test]
    fn fingerprint_distinguishes_sort_fields() {
        let a = plan_fingerprint("Scan", &[], &["created_at"]);
        let b = plan_fingerprint("Scan", &[], &["updated_at"]);
        assert_ne!(a, b);
    }
}
