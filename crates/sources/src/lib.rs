//! External evidence sources for remedium.
//!
//! Each client implements one collaborator trait from `remedium-core`.
//! Clients return raw rows; relevance selection and caching happen in the
//! engine. A client without its credential reports `is_configured() == false`
//! and never touches the network.

mod http;

pub mod fallback;
pub mod generative;
pub mod interactions;
pub mod label;
pub mod literature;
pub mod router;
pub mod text;
pub mod traditional;
pub mod translation;
pub mod web;

pub use fallback::{GeneratorChain, check_shape};
pub use generative::{OpenAiJsonClient, extract_json_object};
pub use http::truncate;
pub use interactions::DurRegistry;
pub use label::MfdsLabelRegistry;
pub use literature::PubMedSearch;
pub use router::{SourceSet, build_from_config};
pub use text::ManualTextSource;
pub use traditional::SimPreSearch;
pub use translation::GoogleTranslator;
pub use web::TavilySearch;
