use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{json_list, now, points::award_points, require_text, user::UserAuthenticationData};
use crate::error::{AppError, AppResult};

pub const DEFAULT_QUESTION_POINTS: i64 = 5;
const MAX_QUESTION_POINTS: i64 = 100;

/// A multiple-choice safety question. `correct_option` indexes `options`.
#[derive(Debug, Clone, Serialize)]
pub struct QuizQuestion {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub question: String,
    pub options: Vec<String>,
    pub correct_option: i64,
    pub points: i64,
    pub active: bool,
    pub created_at: String,
}
#[derive(Debug, Deserialize, Serialize)]
pub struct QuizQuestionRequest {
    pub question: String,
    pub options: Vec<String>,
    pub correct_option: i64,
    pub points: Option<i64>,
}
/// What a player sees: no answer key, plus whether they already answered.
#[derive(Debug, Serialize)]
pub struct QuizQuestionView {
    pub id: i64,
    pub question: String,
    pub options: Vec<String>,
    pub points: i64,
    pub answered: bool,
}
#[derive(Debug, Deserialize, Serialize)]
pub struct QuizAnswerRequest {
    pub option: i64,
}
#[derive(Debug, Serialize)]
pub struct QuizAnswerOutcome {
    pub correct: bool,
    pub points_awarded: i64,
}

impl QuizQuestion {
    const COLUMNS: &'static str = "id, question, options, correct_option, points, active, created_at";

    pub fn from_request(request: QuizQuestionRequest) -> Self {
        Self {
            id: None,
            question: request.question,
            options: request
                .options
                .into_iter()
                .map(|option| option.trim().to_string())
                .collect(),
            correct_option: request.correct_option,
            points: request.points.unwrap_or(DEFAULT_QUESTION_POINTS),
            active: true,
            created_at: now(),
        }
    }

    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        let options: String = row.get("options")?;
        Ok(Self {
            id: Some(row.get("id")?),
            question: row.get("question")?,
            options: json_list(&options)?,
            correct_option: row.get("correct_option")?,
            points: row.get("points")?,
            active: row.get("active")?,
            created_at: row.get("created_at")?,
        })
    }

    fn option_in_range(&self, option: i64) -> bool {
        usize::try_from(option).is_ok_and(|index| index < self.options.len())
    }

    pub fn save(&mut self, conn: &Connection) -> AppResult<i64> {
        require_text("Question", &self.question)?;
        if self.options.len() < 2 || self.options.iter().any(|option| option.is_empty()) {
            return Err(AppError::validation(
                "A question needs at least two non-empty options",
            ));
        }
        if !self.option_in_range(self.correct_option) {
            return Err(AppError::validation("Correct option is out of range"));
        }
        if !(1..=MAX_QUESTION_POINTS).contains(&self.points) {
            return Err(AppError::validation(format!(
                "Points must be between 1 and {MAX_QUESTION_POINTS}"
            )));
        }
        let options = serde_json::to_string(&self.options)?;

        conn.execute(
            "INSERT INTO quiz_questions (question, options, correct_option, points, active,
                                         created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                self.question,
                options,
                self.correct_option,
                self.points,
                self.active,
                self.created_at
            ],
        )?;
        let id = conn.last_insert_rowid();
        self.id = Some(id);
        info!(question_id = id, "quiz question added");
        Ok(id)
    }

    pub fn find_by_id(conn: &Connection, id: i64) -> AppResult<Option<QuizQuestion>> {
        Ok(conn
            .query_row(
                &format!("SELECT {} FROM quiz_questions WHERE id = ?1", Self::COLUMNS),
                params![id],
                Self::from_row,
            )
            .optional()?)
    }

    /// Active questions, oldest first, as seen by `user_id`.
    pub fn find_for_player(conn: &Connection, user_id: i64) -> AppResult<Vec<QuizQuestionView>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM quiz_questions WHERE active = 1 ORDER BY id ASC",
            Self::COLUMNS
        ))?;
        let questions = stmt
            .query_map([], Self::from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        let mut stmt = conn.prepare("SELECT question_id FROM quiz_answers WHERE user_id = ?1")?;
        let answered = stmt
            .query_map(params![user_id], |row| row.get::<_, i64>(0))?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(questions
            .into_iter()
            .filter_map(|question| {
                let id = question.id?;
                Some(QuizQuestionView {
                    id,
                    question: question.question,
                    options: question.options,
                    points: question.points,
                    answered: answered.contains(&id),
                })
            })
            .collect())
    }

    /// Records the player's single attempt and credits the question's points
    /// when it is right.
    pub fn answer(
        conn: &Connection,
        question_id: i64,
        player: &UserAuthenticationData,
        option: i64,
    ) -> AppResult<QuizAnswerOutcome> {
        let question = Self::find_by_id(conn, question_id)?
            .filter(|question| question.active)
            .ok_or_else(|| AppError::not_found("Question not found"))?;
        if !question.option_in_range(option) {
            return Err(AppError::validation("Option is out of range"));
        }
        let previous: Option<i64> = conn
            .query_row(
                "SELECT id FROM quiz_answers WHERE question_id = ?1 AND user_id = ?2",
                params![question_id, player.id],
                |row| row.get(0),
            )
            .optional()?;
        if previous.is_some() {
            return Err(AppError::conflict("Question already answered"));
        }

        let correct = option == question.correct_option;
        conn.execute(
            "INSERT INTO quiz_answers (question_id, user_id, chosen_option, correct, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![question_id, player.id, option, correct, now()],
        )?;
        let points_awarded = if correct {
            award_points(
                conn,
                player.id,
                question.points,
                &format!("Answered quiz question {question_id}"),
            )?;
            question.points
        } else {
            0
        };
        info!(question_id, user_id = player.id, correct, "quiz answered");

        Ok(QuizAnswerOutcome {
            correct,
            points_awarded,
        })
    }

    pub fn delete_by_id(conn: &Connection, id: i64) -> AppResult<()> {
        let deleted = conn.execute("DELETE FROM quiz_questions WHERE id = ?1", params![id])?;
        if deleted == 0 {
            return Err(AppError::not_found("Question not found"));
        }
        Ok(())
    }
}
