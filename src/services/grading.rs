use std::collections::BTreeSet;

use crate::db::models::{QuestionSelection, QuizQuestion, Submission, Task};
use crate::db::types::GradingType;

/// Quiz scoring is all-or-nothing: every question must have exactly the
/// correct set of answers selected, otherwise the whole attempt scores zero.
pub(crate) fn score_quiz(
    questions: &[QuizQuestion],
    selections: &[QuestionSelection],
    max_grade: f64,
) -> f64 {
    if questions.is_empty() {
        return 0.0;
    }
    for question in questions {
        let expected: BTreeSet<&str> = question
            .answers
            .iter()
            .filter(|answer| answer.correct)
            .map(|answer| answer.id.as_str())
            .collect();
        let selected: BTreeSet<&str> = selections
            .iter()
            .find(|selection| selection.question_id == question.id)
            .map(|selection| selection.answer_ids.iter().map(String::as_str).collect())
            .unwrap_or_default();
        if selected != expected {
            return 0.0;
        }
    }
    max_grade
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct FinalGradeTotals {
    pub(crate) grade: f64,
    pub(crate) max_grade: f64,
}

/// Sums per-task grades into the assignment total. Ungraded submissions and
/// tasks without a submission contribute zero; the total never exceeds the
/// sum of task maximums.
pub(crate) fn aggregate(tasks: &[Task], submissions: &[Submission]) -> FinalGradeTotals {
    let max_grade: f64 = tasks.iter().map(|task| task.max_grade).sum();
    let raw: f64 = submissions.iter().filter_map(|submission| submission.grade).sum();
    FinalGradeTotals { grade: raw.clamp(0.0, max_grade), max_grade }
}

pub(crate) fn display_grade(grading_type: GradingType, grade: f64, max_grade: f64) -> String {
    match grading_type {
        GradingType::Numeric => format!("{}/{}", format_points(grade), format_points(max_grade)),
        GradingType::Percentage => format!("{:.2}%", percent_of(grade, max_grade)),
        GradingType::Alphabet => letter_for(percent_of(grade, max_grade)).to_string(),
    }
}

fn percent_of(grade: f64, max_grade: f64) -> f64 {
    if max_grade > 0.0 {
        grade / max_grade * 100.0
    } else {
        0.0
    }
}

fn letter_for(percent: f64) -> &'static str {
    if percent >= 90.0 {
        "A"
    } else if percent >= 80.0 {
        "B"
    } else if percent >= 70.0 {
        "C"
    } else if percent >= 60.0 {
        "D"
    } else {
        "F"
    }
}

fn format_points(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::QuizAnswer;
    use crate::db::types::QuestionType;

    fn question(id: &str, correct: &[&str], wrong: &[&str]) -> QuizQuestion {
        let mut answers = Vec::new();
        for answer_id in correct {
            answers.push(QuizAnswer {
                id: (*answer_id).to_string(),
                text: format!("answer {answer_id}"),
                correct: true,
            });
        }
        for answer_id in wrong {
            answers.push(QuizAnswer {
                id: (*answer_id).to_string(),
                text: format!("answer {answer_id}"),
                correct: false,
            });
        }
        QuizQuestion {
            id: id.to_string(),
            text: format!("question {id}"),
            question_type: QuestionType::MultipleChoice,
            answers,
        }
    }

    fn selection(question_id: &str, answer_ids: &[&str]) -> QuestionSelection {
        QuestionSelection {
            question_id: question_id.to_string(),
            answer_ids: answer_ids.iter().map(|id| (*id).to_string()).collect(),
        }
    }

    #[test]
    fn all_correct_answers_earn_max_grade() {
        let questions = vec![question("q1", &["a1"], &["a2"]), question("q2", &["b1", "b2"], &["b3"])];
        let selections = vec![selection("q1", &["a1"]), selection("q2", &["b2", "b1"])];
        assert_eq!(score_quiz(&questions, &selections, 10.0), 10.0);
    }

    #[test]
    fn one_wrong_question_scores_zero() {
        let questions = vec![question("q1", &["a1"], &["a2"]), question("q2", &["b1"], &["b2"])];
        let selections = vec![selection("q1", &["a1"]), selection("q2", &["b2"])];
        assert_eq!(score_quiz(&questions, &selections, 10.0), 0.0);
    }

    #[test]
    fn extra_selected_answer_scores_zero() {
        let questions = vec![question("q1", &["a1"], &["a2"])];
        let selections = vec![selection("q1", &["a1", "a2"])];
        assert_eq!(score_quiz(&questions, &selections, 5.0), 0.0);
    }

    #[test]
    fn missing_selection_scores_zero() {
        let questions = vec![question("q1", &["a1"], &[]), question("q2", &["b1"], &[])];
        let selections = vec![selection("q1", &["a1"])];
        assert_eq!(score_quiz(&questions, &selections, 5.0), 0.0);
    }

    #[test]
    fn empty_quiz_scores_zero() {
        assert_eq!(score_quiz(&[], &[], 5.0), 0.0);
    }

    #[test]
    fn numeric_display_keeps_raw_points() {
        assert_eq!(display_grade(GradingType::Numeric, 85.0, 100.0), "85/100");
        assert_eq!(display_grade(GradingType::Numeric, 7.5, 10.0), "7.5/10");
    }

    #[test]
    fn percentage_display_uses_two_decimals() {
        assert_eq!(display_grade(GradingType::Percentage, 85.0, 100.0), "85.00%");
        assert_eq!(display_grade(GradingType::Percentage, 1.0, 3.0), "33.33%");
        assert_eq!(display_grade(GradingType::Percentage, 0.0, 0.0), "0.00%");
    }

    #[test]
    fn alphabet_display_maps_thresholds() {
        assert_eq!(display_grade(GradingType::Alphabet, 95.0, 100.0), "A");
        assert_eq!(display_grade(GradingType::Alphabet, 90.0, 100.0), "A");
        assert_eq!(display_grade(GradingType::Alphabet, 85.0, 100.0), "B");
        assert_eq!(display_grade(GradingType::Alphabet, 70.0, 100.0), "C");
        assert_eq!(display_grade(GradingType::Alphabet, 60.0, 100.0), "D");
        assert_eq!(display_grade(GradingType::Alphabet, 59.9, 100.0), "F");
    }
}
