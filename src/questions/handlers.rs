use axum::extract::{Multipart, State};
use chrono::{Offset, TimeZone};
use chrono_tz::Tz;
use time::{macros::format_description, OffsetDateTime, UtcOffset};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    auth::AuthUser,
    error::{AppError, AppResult},
    extract::{ApiJson, ApiQuery},
    questions::{
        dto::{
            AnswerView, CategoryQuery, CategoryQuestions, ImportResponse, SearchQuery,
            SearchResponse, SubmitAnswerRequest, SubmitAnswerResponse,
        },
        import::import_questions,
    },
    response::ApiResponse,
    state::AppState,
    upload::{looks_like_csv, spool_field},
    users::repo_types::AnswerSubmission,
};

/// Multipart field `csv`. The spooled file is deleted when the handler returns.
#[instrument(skip_all, fields(user_id = %user.id))]
pub async fn bulk_import(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    mut mp: Multipart,
) -> AppResult<ApiResponse<ImportResponse>> {
    let upload = spool_field(&mut mp, "csv", &state.config.upload_dir)
        .await?
        .ok_or_else(|| AppError::bad_request("CSV file is missing"))?;

    if !looks_like_csv(upload.content_type.as_deref(), upload.file_name.as_deref()) {
        warn!(content_type = ?upload.content_type, "upload is not a csv");
        return Err(AppError::bad_request("CSV file is missing"));
    }

    let questions = import_questions(
        state.categories.as_ref(),
        state.questions.as_ref(),
        upload.path(),
    )
    .await?;

    info!(count = questions.len(), bytes = upload.size, "bulk import done");
    Ok(ApiResponse::ok(
        ImportResponse { questions },
        "Bulk questions imported successfully",
    ))
}

#[instrument(skip(state))]
pub async fn questions_by_category(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<CategoryQuery>,
) -> AppResult<ApiResponse<CategoryQuestions>> {
    let filter = query
        .category_name
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty());
    let categories = state.questions.list_by_category_name(filter).await?;
    if categories.is_empty() {
        return Err(AppError::not_found(
            "No categories found or no questions for the specified category",
        ));
    }
    Ok(ApiResponse::ok(
        CategoryQuestions { categories },
        "Questions fetched successfully",
    ))
}

#[instrument(skip_all, fields(user_id = %user.id))]
pub async fn submit_answer(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    ApiJson(payload): ApiJson<SubmitAnswerRequest>,
) -> AppResult<ApiResponse<SubmitAnswerResponse>> {
    let (Some(question_id), Some(selected_answer)) = (
        payload.question_id.filter(|s| !s.trim().is_empty()),
        payload.selected_answer.filter(|s| !s.is_empty()),
    ) else {
        return Err(AppError::bad_request(
            "Question ID and selected answer are required",
        ));
    };
    let question_id = Uuid::parse_str(question_id.trim())
        .map_err(|_| AppError::bad_request("Invalid question id"))?;

    if state.questions.find_by_id(question_id).await?.is_none() {
        return Err(AppError::not_found("Question not found"));
    }

    let answer = AnswerSubmission {
        question: question_id,
        selected_answer,
        submitted_at: OffsetDateTime::now_utc().unix_timestamp(),
    };
    if !state.users.push_answer(user.id, &answer).await? {
        return Err(AppError::not_found("User not found"));
    }

    info!(question_id = %question_id, "answer submitted");
    Ok(ApiResponse::ok(
        SubmitAnswerResponse { answer },
        "Answer submitted successfully",
    ))
}

/// Search the caller's own answers by question text or selected answer.
#[instrument(skip_all, fields(user_id = %user.id))]
pub async fn search_with_answer(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    ApiQuery(query): ApiQuery<SearchQuery>,
) -> AppResult<ApiResponse<SearchResponse>> {
    let needle = query
        .search_query
        .as_deref()
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .ok_or_else(|| AppError::bad_request("Search query is required"))?;
    let zone = parse_timezone(query.timezone.as_deref())?;

    let hits = state.users.search_answers(user.id, needle).await?;
    if hits.is_empty() {
        return Err(AppError::not_found("No answers found for the search query"));
    }

    let answers = hits
        .into_iter()
        .map(|h| -> AppResult<AnswerView> {
            Ok(AnswerView {
                submission_time: format_submission(h.submitted_at, zone)?,
                question_text: h.question_text,
                options: h.options,
                correct_answer: h.correct_answer,
                selected_answer: h.selected_answer,
            })
        })
        .collect::<AppResult<Vec<_>>>()?;

    Ok(ApiResponse::ok(
        SearchResponse { answers },
        "Answers and corresponding questions fetched successfully",
    ))
}

/// Zone used to render submission times.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Zone {
    Fixed(UtcOffset),
    Named(Tz),
}

impl Zone {
    /// Offset in effect at `unix`; named zones follow their DST rules.
    fn offset_at(&self, unix: i64) -> Option<UtcOffset> {
        match self {
            Zone::Fixed(offset) => Some(*offset),
            Zone::Named(tz) => {
                let at = chrono::DateTime::from_timestamp(unix, 0)?;
                let secs = tz.offset_from_utc_datetime(&at.naive_utc()).fix().local_minus_utc();
                UtcOffset::from_whole_seconds(secs).ok()
            }
        }
    }
}

/// `UTC`, `Z`, a fixed `±HH:MM` offset or an IANA name such as
/// `Asia/Kolkata`. Missing means UTC.
pub(crate) fn parse_timezone(raw: Option<&str>) -> AppResult<Zone> {
    let raw = match raw.map(str::trim) {
        None | Some("") => return Ok(Zone::Fixed(UtcOffset::UTC)),
        Some(s) if s.eq_ignore_ascii_case("utc") || s == "Z" => {
            return Ok(Zone::Fixed(UtcOffset::UTC))
        }
        Some(s) => s,
    };
    let invalid = || AppError::bad_request(format!("Invalid timezone: {raw}"));

    let (sign, rest) = match raw.as_bytes().first() {
        Some(b'+') => (1i8, &raw[1..]),
        Some(b'-') => (-1i8, &raw[1..]),
        _ => return raw.parse::<Tz>().map(Zone::Named).map_err(|_| invalid()),
    };
    let (h, m) = rest.split_once(':').ok_or_else(invalid)?;
    let two_digits = |s: &str| s.len() == 2 && s.bytes().all(|b| b.is_ascii_digit());
    if !two_digits(h) || !two_digits(m) {
        return Err(invalid());
    }
    let h: i8 = h.parse().map_err(|_| invalid())?;
    let m: i8 = m.parse().map_err(|_| invalid())?;
    if m >= 60 {
        return Err(invalid());
    }
    UtcOffset::from_hms(sign * h, sign * m, 0)
        .map(Zone::Fixed)
        .map_err(|_| invalid())
}

pub(crate) fn format_submission(unix: i64, zone: Zone) -> AppResult<String> {
    const FAILED: &str = "Error while searching answers with questions";
    let offset = zone
        .offset_at(unix)
        .ok_or_else(|| AppError::internal(FAILED, format!("no offset for {unix} in {zone:?}")))?;
    let at = OffsetDateTime::from_unix_timestamp(unix)
        .map_err(|e| AppError::internal(FAILED, e))?
        .to_offset(offset);
    at.format(format_description!(
        "[year]-[month]-[day] [hour]:[minute]:[second]"
    ))
    .map_err(|e| AppError::internal(FAILED, e))
}
