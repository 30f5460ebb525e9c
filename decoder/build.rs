//! Generates `ectf_params.rs` from a provisioning-time secrets file.
//!
//! Mirrors the original build script's job of turning a host-generated
//! secrets JSON document into `const` byte arrays the firmware can embed,
//! just scoped to the constants the decoder actually needs (no Argon2
//! derivation: unlike the application processor, the decoder never derives
//! a key from an operator-supplied password, it only ever consumes
//! already-derived per-decoder key material written into its secrets file
//! by the deployment tool).

use std::env;
use std::fs;
use std::path::Path;

use rand::RngCore;
use serde::Deserialize;

#[derive(Deserialize)]
struct DecoderSecrets {
    decoder_id: u32,
    #[serde(with = "hex32")]
    id_key: [u8; 32],
    #[serde(with = "hex32")]
    encoder_public_key: [u8; 32],
    #[serde(with = "hex32")]
    left_tree_key: [u8; 32],
    #[serde(with = "hex32")]
    right_tree_key: [u8; 32],
    #[serde(with = "hex16")]
    channel0_root_key: [u8; 16],
    #[serde(with = "hex32")]
    channel0_kch: [u8; 32],
}

fn main() {
    println!("cargo:rerun-if-env-changed=DECODER_SECRETS_PATH");

    let secrets = match env::var("DECODER_SECRETS_PATH") {
        Ok(path) => {
            println!("cargo:rerun-if-changed={path}");
            let contents = fs::read_to_string(&path)
                .unwrap_or_else(|e| panic!("failed to read {path}: {e}"));
            serde_json::from_str(&contents)
                .unwrap_or_else(|e| panic!("failed to parse {path}: {e}"))
        }
        Err(_) => {
            println!(
                "cargo:warning=DECODER_SECRETS_PATH not set; generating ephemeral secrets. \
                 This build is not provisioned and must not be shipped."
            );
            ephemeral_secrets()
        }
    };

    let out_dir = env::var("OUT_DIR").expect("OUT_DIR set by cargo");
    let dest = Path::new(&out_dir).join("ectf_params.rs");

    let generated = format!(
        "pub const DECODER_ID: u32 = {decoder_id};\n\
         pub const ID_KEY: [u8; 32] = {id_key};\n\
         pub const ENCODER_PUBLIC_KEY: [u8; 32] = {encoder_public_key};\n\
         pub const LEFT_TREE_KEY: [u8; 32] = {left_tree_key};\n\
         pub const RIGHT_TREE_KEY: [u8; 32] = {right_tree_key};\n\
         pub const CHANNEL0_ROOT_KEY: [u8; 16] = {channel0_root_key};\n\
         pub const CHANNEL0_KCH: [u8; 32] = {channel0_kch};\n",
        decoder_id = secrets.decoder_id,
        id_key = add_bytes(&secrets.id_key),
        encoder_public_key = add_bytes(&secrets.encoder_public_key),
        left_tree_key = add_bytes(&secrets.left_tree_key),
        right_tree_key = add_bytes(&secrets.right_tree_key),
        channel0_root_key = add_bytes(&secrets.channel0_root_key),
        channel0_kch = add_bytes(&secrets.channel0_kch),
    );

    fs::write(&dest, generated).expect("failed to write ectf_params.rs");
}

/// Renders a byte array as an array literal, e.g. `[0x01, 0x02, ...]`.
fn add_bytes(bytes: &[u8]) -> String {
    let mut out = String::from("[");
    for (i, byte) in bytes.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        out.push_str(&format!("0x{byte:02x}"));
    }
    out.push(']');
    out
}

fn ephemeral_secrets() -> DecoderSecrets {
    let mut rng = rand::thread_rng();
    let mut fill = |buf: &mut [u8]| rng.fill_bytes(buf);

    let mut id_key = [0u8; 32];
    let mut encoder_public_key = [0u8; 32];
    let mut left_tree_key = [0u8; 32];
    let mut right_tree_key = [0u8; 32];
    let mut channel0_root_key = [0u8; 16];
    let mut channel0_kch = [0u8; 32];

    fill(&mut id_key);
    fill(&mut encoder_public_key);
    fill(&mut left_tree_key);
    fill(&mut right_tree_key);
    fill(&mut channel0_root_key);
    fill(&mut channel0_kch);

    DecoderSecrets {
        decoder_id: rng.next_u32(),
        id_key,
        encoder_public_key,
        left_tree_key,
        right_tree_key,
        channel0_root_key,
        channel0_kch,
    }
}

mod hex32 {
    pub fn deserialize<'de, D>(d: D) -> Result<[u8; 32], D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        super::hex::deserialize::<32, D>(d)
    }
}

mod hex16 {
    pub fn deserialize<'de, D>(d: D) -> Result<[u8; 16], D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        super::hex::deserialize::<16, D>(d)
    }
}

mod hex {
    use serde::Deserialize;

    pub fn deserialize<'de, const N: usize, D>(d: D) -> Result<[u8; N], D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(d)?;
        let s = s.strip_prefix("0x").unwrap_or(&s);
        if s.len() != N * 2 {
            return Err(serde::de::Error::custom(format!(
                "expected {} hex chars, got {}",
                N * 2,
                s.len()
            )));
        }
        let mut out = [0u8; N];
        for i in 0..N {
            out[i] = u8::from_str_radix(&s[i * 2..i * 2 + 2], 16)
                .map_err(serde::de::Error::custom)?;
        }
        Ok(out)
    }
}
