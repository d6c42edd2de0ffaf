pub mod loaders;
pub mod question;
pub mod quiz;
pub mod status;

pub use loaders::{load_all_toml_files, load_toml_to_quiz};
pub use question::{
    Blank, CategoryAssignment, Difficulty, Letter, MatchingPair, Question, QuestionPayload,
    QuestionType,
};
pub use quiz::{
    BatchKey, ContentChunk, GenerationMetadata, ModuleSelection, ModuleSource, QuestionBatch,
    Quiz, QuizLanguage,
};
pub use status::{validate_transition, FailureReason, QuizStatus};
