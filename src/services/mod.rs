//! Service clients and adapters around the external collaborators

pub mod bus;
pub mod embedding;
pub mod feed_poller;
pub mod model_client;
pub mod recipe_store;
pub mod search_index;

pub use bus::{BusConsumer, BusProducer, BusRecord};
pub use embedding::{embedding_text, Embedder, EmbeddingClient};
pub use feed_poller::{FeedEvent, FeedPoller};
pub use model_client::{AnthropicClient, CompletionModel};
pub use recipe_store::{CreateOutcome, RecipeStore};
pub use search_index::{SearchIndex, SearchMode, SyncReport};
