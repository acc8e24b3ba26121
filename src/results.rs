//! Scoring of comprehension answers and the baseline-versus-music summary.

use std::collections::BTreeMap;

use crate::models::{Answer, AnswerRecord, LessonPayload, QuestionResponse, SectionScore, SummaryReport};

/// Compare answers against the lesson's key. Missing or absent answers count
/// as incorrect; answers beyond the question list are ignored.
pub fn score_section(
    lesson: &LessonPayload,
    answers: &[Option<Answer>],
    section_label: &str,
    had_music: bool,
) -> AnswerRecord {
    let responses: Vec<QuestionResponse> = lesson
        .questions
        .iter()
        .enumerate()
        .map(|(index, question)| QuestionResponse {
            question_text: question.text.clone(),
            respondent_answer: answers.get(index).copied().flatten(),
            correct_response: question.correct_response,
        })
        .collect();

    let correct_count = responses
        .iter()
        .filter(|r| r.respondent_answer == Some(r.correct_response))
        .count();

    AnswerRecord {
        section_label: section_label.to_string(),
        had_music,
        total_questions: responses.len(),
        correct_count,
        responses,
    }
}

pub fn percentage(score: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        score as f64 / total as f64 * 100.0
    }
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// Per-section percentages and the music/no-music comparison
pub fn summarize(records: &BTreeMap<String, AnswerRecord>) -> SummaryReport {
    let mut per_section = BTreeMap::new();
    let mut baseline = Vec::new();
    let mut music = Vec::new();

    for record in records.values() {
        let pct = percentage(record.correct_count, record.total_questions);
        per_section.insert(
            record.section_label.clone(),
            SectionScore {
                score: record.correct_count,
                total: record.total_questions,
                percentage: pct,
            },
        );
        if record.had_music {
            music.push(pct);
        } else {
            baseline.push(pct);
        }
    }

    let baseline_avg = mean(&baseline);
    let music_avg = mean(&music);
    let improvement = match (baseline_avg, music_avg) {
        (Some(base), Some(with_music)) => Some(with_music - base),
        _ => None,
    };

    SummaryReport {
        per_section,
        baseline_avg,
        music_avg,
        improvement,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::QuestionItem;

    fn lesson(key: &[Answer]) -> LessonPayload {
        LessonPayload {
            passage: "Passage".to_string(),
            questions: key
                .iter()
                .enumerate()
                .map(|(i, answer)| QuestionItem {
                    text: format!("Question {}?", i + 1),
                    correct_response: *answer,
                })
                .collect(),
        }
    }

    fn record(label: &str, had_music: bool, correct: usize, total: usize) -> AnswerRecord {
        AnswerRecord {
            section_label: label.to_string(),
            had_music,
            responses: Vec::new(),
            correct_count: correct,
            total_questions: total,
        }
    }

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 0.05
    }

    #[test]
    fn test_score_section() {
        use Answer::*;
        let lesson = lesson(&[Yes, No, Yes]);
        let record = score_section(&lesson, &[Some(Yes), Some(Yes), Some(Yes)], "Test Section 1", false);

        assert_eq!(record.correct_count, 2);
        assert_eq!(record.total_questions, 3);
        assert_eq!(record.responses[1].respondent_answer, Some(Yes));
        assert_eq!(record.responses[1].correct_response, No);
        assert_eq!(record.responses[1].question_text, "Question 2?");
        assert!(!record.had_music);
    }

    #[test]
    fn test_missing_answers_are_incorrect() {
        use Answer::*;
        let lesson = lesson(&[No, No, Yes]);
        let record = score_section(&lesson, &[Some(No), None], "Test Section 2", true);
        assert_eq!(record.correct_count, 1);
        assert_eq!(record.total_questions, 3);
        assert_eq!(record.responses[2].respondent_answer, None);
    }

    #[test]
    fn test_error_state_lesson_scores_zero_of_zero() {
        let record = score_section(&LessonPayload::error_state(false), &[Some(Answer::Yes)], "Test Section 3", true);
        assert_eq!((record.correct_count, record.total_questions), (0, 0));
        assert_eq!(percentage(0, 0), 0.0);
    }

    #[test]
    fn test_summary_averages() {
        let mut records = BTreeMap::new();
        records.insert("section_1".to_string(), record("Test Section 1", false, 2, 3));
        records.insert("section_2".to_string(), record("Test Section 2", true, 3, 3));
        records.insert("section_3".to_string(), record("Test Section 3", true, 4, 5));

        let summary = summarize(&records);

        assert!(approx(summary.baseline_avg.unwrap(), 66.7));
        assert!(approx(summary.music_avg.unwrap(), 90.0));
        assert!(approx(summary.improvement.unwrap(), 23.3));
        assert_eq!(summary.per_section["Test Section 2"].percentage, 100.0);
        assert_eq!(summary.per_section.len(), 3);
    }

    #[test]
    fn test_empty_partition_has_no_average() {
        let mut records = BTreeMap::new();
        records.insert("section_2".to_string(), record("Test Section 2", true, 1, 2));

        let summary = summarize(&records);
        assert_eq!(summary.baseline_avg, None);
        assert_eq!(summary.music_avg, Some(50.0));
        assert_eq!(summary.improvement, None);

        let empty = summarize(&BTreeMap::new());
        assert!(empty.per_section.is_empty());
        assert_eq!(empty.music_avg, None);
    }
}
