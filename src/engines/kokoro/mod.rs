//! Kokoro-82M over ONNX Runtime (the `kokoro` feature).
//!
//! Fast single-speaker synthesis. Multi-speaker scripts are spoken one segment
//! at a time, each speaker with their own voice from the voice map.
//!
//! Needs **espeak-ng** on `PATH` for phonemization:
//! - **Linux**: `sudo apt-get install espeak-ng`
//! - **macOS**: `brew install espeak-ng`
//! - **Windows**: <https://espeak-ng.org/download>
//!
//! # Model directory
//!
//! `installation.models_dir` in the config, `~/.hearme/models` by default:
//!
//! ```text
//! ~/.hearme/models/kokoro/
//! ├── kokoro-quant-convinteger.onnx   # any *.onnx export works
//! ├── voices-v1.0.bin                 # .npz of style tables
//! └── config.json                     # optional, vocabulary
//! ```
//!
//! | Voice prefix | Language | espeak-ng |
//! |---|---|---|
//! | `af_`, `am_` | American English | `en-us` |
//! | `bf_`, `bm_` | British English | `en-gb` |
//! | `ef_`, `em_` | Spanish | `es` |
//! | `ff_` | French | `fr` |
//! | `hf_`, `hm_` | Hindi | `hi` |
//! | `if_`, `im_` | Italian | `it` |
//! | `jf_`, `jm_` | Japanese | `ja` |
//! | `pf_`, `pm_` | Brazilian Portuguese | `pt-br` |
//! | `zf_`, `zm_` | Mandarin Chinese | `cmn` |

mod engine;
mod model;
mod phonemizer;
mod vocab;
mod voices;

pub use engine::{KokoroEngine, DEFAULT_VOICE};
pub use model::{KokoroError, SAMPLE_RATE};
