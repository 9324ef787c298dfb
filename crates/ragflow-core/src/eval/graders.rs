//! LLM-judged quality metrics

use crate::error::{RagFlowError, Result};
use crate::eval::EvaluationRecord;
use crate::llm::CompletionModel;
use crate::prompt::RenderedPrompt;

/// One graded metric: a judging instruction plus the scalar it produces
pub struct Grader {
    pub name: &'static str,
    instruction: &'static str,
}

/// The four answer-quality metrics, graded independently per record
pub const GRADERS: [Grader; 4] = [
    Grader {
        name: "fluency",
        instruction: "Rate how grammatically correct and naturally written the answer is, \
                      independent of whether it is factually right.",
    },
    Grader {
        name: "groundedness",
        instruction: "Rate how well every claim in the answer is supported by the provided \
                      context documents. Claims not found in the context lower the score.",
    },
    Grader {
        name: "relevance",
        instruction: "Rate how directly the answer addresses the question that was asked.",
    },
    Grader {
        name: "coherence",
        instruction: "Rate how logically organized and easy to follow the answer is.",
    },
];

impl Grader {
    /// Ask the judge model for a 1-5 score for this record
    pub async fn grade(
        &self,
        judge: &dyn CompletionModel,
        record: &EvaluationRecord,
    ) -> Result<f32> {
        let prompt = self.build_prompt(record);
        let completion = judge.complete(&prompt).await?;
        parse_score(&completion.answer)
    }

    fn build_prompt(&self, record: &EvaluationRecord) -> RenderedPrompt {
        let context = record
            .context
            .iter()
            .map(|d| format!("## {}\n{}", d.title, d.content))
            .collect::<Vec<_>>()
            .join("\n\n");

        let ground_truth = record
            .ground_truth
            .as_deref()
            .map(|gt| format!("\nReference answer:\n{gt}\n"))
            .unwrap_or_default();

        RenderedPrompt {
            system: format!(
                "You are an impartial grader of question-answering quality. {} \
                 Respond with a single integer from 1 (worst) to 5 (best) and nothing else.",
                self.instruction
            ),
            user: format!(
                "Question:\n{}\n\nContext:\n{}\n{}\nAnswer:\n{}\n\nScore:",
                record.question, context, ground_truth, record.answer
            ),
        }
    }
}

/// Extract the 1-5 score from a judge reply.
///
/// Judges occasionally wrap the number in prose; take the first numeric
/// token and validate its range.
pub fn parse_score(text: &str) -> Result<f32> {
    let number: String = text
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit() || *c == '.')
        .collect();

    let score: f32 = number
        .parse()
        .map_err(|_| RagFlowError::Evaluation(format!("no score in judge reply: {text:?}")))?;

    if !(1.0..=5.0).contains(&score) {
        return Err(RagFlowError::Evaluation(format!(
            "score {score} outside 1-5 range"
        )));
    }
    Ok(score)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bare_and_wrapped_scores() {
        assert_eq!(parse_score("4").unwrap(), 4.0);
        assert_eq!(parse_score("Score: 3").unwrap(), 3.0);
        assert_eq!(parse_score("I would rate this 4.5 out of 5").unwrap(), 4.5);
    }

    #[test]
    fn rejects_missing_or_out_of_range_scores() {
        assert!(parse_score("no number here").is_err());
        assert!(parse_score("10").is_err());
        assert!(parse_score("0").is_err());
    }

    #[test]
    fn prompt_includes_question_context_and_answer() {
        let record = EvaluationRecord {
            question: "What is covered?".into(),
            chat_history: vec![],
            answer: "Telehealth is covered.".into(),
            context: vec![crate::search::RetrievedDocument {
                id: "1".into(),
                title: "Coverage".into(),
                content: "Telehealth services are covered.".into(),
                url: String::new(),
            }],
            ground_truth: Some("Yes, telehealth is covered.".into()),
            scores: Default::default(),
            error: None,
        };
        let prompt = GRADERS[1].build_prompt(&record);
        assert!(prompt.system.contains("supported by the provided"));
        assert!(prompt.user.contains("What is covered?"));
        assert!(prompt.user.contains("Telehealth services are covered."));
        assert!(prompt.user.contains("Reference answer"));
    }
}
