//! Per-decoder secrets baked in at build time by `build.rs` from the
//! provisioning secrets file. See `DECODER_SECRETS_PATH` in `build.rs`.

include!(concat!(env!("OUT_DIR"), "/ectf_params.rs"));
