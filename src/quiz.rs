use include_dir::{include_dir, Dir};
use serde::Deserialize;

use crate::error::InvigilError;

static QUESTION_DIR: Dir = include_dir!("assets/questions");

/// One multiple-choice question. `correct` is an index into `options`.
#[derive(Deserialize, Clone, Debug)]
pub struct Question {
    pub prompt: String,
    pub options: Vec<String>,
    pub correct: usize,
}

/// Question bank for one topic, embedded at build time.
#[derive(Deserialize, Clone, Debug)]
pub struct QuestionBank {
    pub id: String,
    pub name: String,
    pub description: String,
    pub questions: Vec<Question>,
}

impl QuestionBank {
    pub fn load(topic: &str) -> Result<Self, InvigilError> {
        let file_name = format!("{topic}.json");
        let file = QUESTION_DIR
            .get_file(&file_name)
            .ok_or_else(|| InvigilError::UnknownTopic {
                topic: topic.to_string(),
            })?;
        let raw = file.contents_utf8().ok_or_else(|| InvigilError::UnknownTopic {
            topic: topic.to_string(),
        })?;
        serde_json::from_str(raw).map_err(|source| InvigilError::QuestionBank {
            file: file_name,
            source,
        })
    }

    /// Catalogue of every embedded topic, for the selection screen.
    pub fn catalogue() -> Vec<QuestionBank> {
        let mut banks: Vec<QuestionBank> = QUESTION_DIR
            .files()
            .filter_map(|file| file.contents_utf8())
            .filter_map(|raw| serde_json::from_str(raw).ok())
            .collect();
        banks.sort_by(|a: &QuestionBank, b: &QuestionBank| a.id.cmp(&b.id));
        banks
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }
}

/// Ordered answers for one session, fixed to the bank size. An unset entry
/// means the question was never answered.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AnswerSheet {
    answers: Vec<Option<usize>>,
}

impl AnswerSheet {
    pub fn new(len: usize) -> Self {
        Self {
            answers: vec![None; len],
        }
    }

    pub fn select(&mut self, question: usize, option: usize) {
        if let Some(slot) = self.answers.get_mut(question) {
            *slot = Some(option);
        }
    }

    pub fn get(&self, question: usize) -> Option<usize> {
        self.answers.get(question).copied().flatten()
    }

    pub fn answered_count(&self) -> usize {
        self.answers.iter().filter(|a| a.is_some()).count()
    }

    pub fn as_slice(&self) -> &[Option<usize>] {
        &self.answers
    }

    pub fn len(&self) -> usize {
        self.answers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.answers.is_empty()
    }

    /// Count of answers matching the bank's correct index. Unanswered
    /// questions never count as correct.
    pub fn score(&self, questions: &[Question]) -> usize {
        self.answers
            .iter()
            .zip(questions)
            .filter(|(answer, question)| **answer == Some(question.correct))
            .count()
    }
}

/// Grade banding for the result screen.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Grade {
    pub letter: char,
    pub message: &'static str,
}

impl Grade {
    pub fn from_score(score: usize, total: usize) -> Self {
        let percentage = if total == 0 {
            0
        } else {
            score * 100 / total
        };
        match percentage {
            90..=100 => Grade { letter: 'A', message: "Excellent!" },
            80..=89 => Grade { letter: 'B', message: "Good job!" },
            70..=79 => Grade { letter: 'C', message: "Fair performance" },
            60..=69 => Grade { letter: 'D', message: "Needs improvement" },
            _ => Grade { letter: 'F', message: "Please retake the quiz" },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bank(correct: &[usize]) -> Vec<Question> {
        correct
            .iter()
            .enumerate()
            .map(|(i, &c)| Question {
                prompt: format!("q{i}"),
                options: vec!["a".into(), "b".into(), "c".into(), "d".into()],
                correct: c,
            })
            .collect()
    }

    #[test]
    fn loads_every_embedded_topic() {
        for topic in ["os", "computer_networks", "dsa"] {
            let bank = QuestionBank::load(topic).unwrap();
            assert_eq!(bank.id, topic);
            assert_eq!(bank.len(), 10);
            for q in &bank.questions {
                assert_eq!(q.options.len(), 4);
                assert!(q.correct < q.options.len());
            }
        }
    }

    #[test]
    fn unknown_topic_is_an_error() {
        assert!(QuestionBank::load("philosophy").is_err());
    }

    #[test]
    fn catalogue_lists_all_topics_sorted() {
        let ids: Vec<String> = QuestionBank::catalogue().into_iter().map(|b| b.id).collect();
        assert_eq!(ids, ["computer_networks", "dsa", "os"]);
    }

    #[test]
    fn score_counts_only_matching_answers() {
        let questions = bank(&[1, 2, 0, 3]);
        let mut sheet = AnswerSheet::new(questions.len());
        sheet.select(0, 1); // correct
        sheet.select(1, 0); // wrong
        sheet.select(3, 3); // correct; q2 left unanswered

        assert_eq!(sheet.score(&questions), 2);
    }

    #[test]
    fn unanswered_never_counts_as_correct() {
        let questions = bank(&[0, 0]);
        let sheet = AnswerSheet::new(questions.len());
        assert_eq!(sheet.score(&questions), 0);
    }

    #[test]
    fn select_overwrites_previous_choice() {
        let mut sheet = AnswerSheet::new(3);
        sheet.select(1, 0);
        sheet.select(1, 2);
        assert_eq!(sheet.get(1), Some(2));
        assert_eq!(sheet.answered_count(), 1);
    }

    #[test]
    fn select_out_of_range_is_ignored() {
        let mut sheet = AnswerSheet::new(2);
        sheet.select(5, 0);
        assert_eq!(sheet.answered_count(), 0);
    }

    #[test]
    fn grade_bands_match_the_result_screen() {
        assert_eq!(Grade::from_score(9, 10).letter, 'A');
        assert_eq!(Grade::from_score(8, 10).letter, 'B');
        assert_eq!(Grade::from_score(7, 10).letter, 'C');
        assert_eq!(Grade::from_score(6, 10).letter, 'D');
        assert_eq!(Grade::from_score(5, 10).letter, 'F');
        assert_eq!(Grade::from_score(0, 0).letter, 'F');
    }
}
