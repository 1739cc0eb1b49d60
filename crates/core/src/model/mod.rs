mod assessment;
mod ids;
mod question;
mod result;

pub use assessment::{AssessmentDefinition, AssessmentError};
pub use ids::{AssessmentId, CandidateId, ParseIdError, QuestionId, SessionId};
pub use question::{OptionKey, Question, QuestionError};
pub use result::{AssessmentResult, QuestionOutcome};
