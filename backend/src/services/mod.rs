pub mod aggregator;
pub mod history_service;
pub mod llm_service;
pub mod pipeline;
pub mod relevance_service;
pub mod search_service;
pub mod summary_service;
pub mod token_service;
pub mod transcript_service;
