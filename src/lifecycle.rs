// src/lifecycle.rs
//
// Request lifecycle state machine. Pure and synchronous: every operation
// takes the current row snapshot and returns the field patch to persist
// plus the notification events to dispatch afterwards. No I/O happens
// here; the query layer applies the patch and fires the events
// best-effort.
use chrono::NaiveDateTime;
use thiserror::Error;

use crate::db::models::request::{
    FinalStatus, GradeType, Request, RequestStatus, RequestType, ValidationStatus,
};
use crate::db::models::user::roles;

pub const MAX_TITLE_LEN: usize = 200;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LifecycleError {
    #[error("Request is not awaiting validation")]
    NotPending,
    #[error("Request has not passed validation")]
    NotValidated,
    #[error("Request is already routed to a handler and cannot be re-routed")]
    AlreadyRouted,
    #[error("Only validation-rejected requests can be resubmitted")]
    NotRejected,
    #[error("A non-empty rejection reason is required")]
    MissingReason,
    #[error("A non-empty comment is required when rejecting")]
    MissingComment,
    #[error("Request is in a terminal state")]
    Terminal,
    #[error("Grade inquiries must carry a grade type")]
    MissingGradeType,
    #[error("Grade inquiries must be routed to a handler at submission")]
    MissingHandler,
    #[error("Title must not be empty")]
    EmptyTitle,
    #[error("Title must not exceed {MAX_TITLE_LEN} characters")]
    TitleTooLong,
    #[error("Description must not be empty")]
    EmptyDescription,
}

/// Field-level patch produced by a transition. `None` leaves the column
/// untouched; the nested `Option` writes NULL.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct RequestPatch {
    pub status: Option<RequestStatus>,
    pub validation_status: Option<ValidationStatus>,
    pub final_status: Option<Option<FinalStatus>>,
    pub routed_to: Option<i32>,
    pub routed_to_role: Option<String>,
    pub rejection_reason: Option<Option<String>>,
    pub final_comment: Option<String>,
    pub resolved_at: Option<Option<NaiveDateTime>>,
    pub resolved_by: Option<Option<i32>>,
    pub title: Option<String>,
    pub description: Option<String>,
}

/// Notification side effect of a transition. Events are plain data so
/// that dispatch failures can never feed back into the state change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionEvent {
    AssignedToHandler { handler_id: i32 },
    ValidationApproved { creator_id: i32 },
    ValidationRejected { creator_id: i32, reason: String },
    TreatmentApproved { creator_id: i32 },
    TreatmentRejected { creator_id: i32, comment: String },
}

#[derive(Debug, PartialEq)]
pub struct Transition {
    pub patch: RequestPatch,
    pub events: Vec<TransitionEvent>,
}

/// Initial field values for a freshly submitted request.
#[derive(Debug, PartialEq)]
pub struct Submission {
    pub status: RequestStatus,
    pub validation_status: ValidationStatus,
    pub routed_to: Option<i32>,
    pub routed_to_role: Option<String>,
    pub events: Vec<TransitionEvent>,
}

/// Routing supplied by the validator for requests the requester did not
/// route at submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Routing {
    pub handler_id: i32,
    pub handler_role: String,
}

/// CC issues go to the teacher, SN issues to the department head.
pub fn handler_role_for(grade_type: GradeType) -> &'static str {
    match grade_type {
        GradeType::Cc => roles::TEACHER,
        GradeType::Sn => roles::DEPARTMENT_HEAD,
    }
}

/// Grade inquiries carrying a grade type are presumed conformant at
/// submission: the validator's later approval only confirms document
/// conformity and must not notify the creator again.
pub fn presumed_validated(request_type: RequestType, grade_type: Option<GradeType>) -> bool {
    request_type == RequestType::GradeInquiry && grade_type.is_some()
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Validates title/description bounds for submission and resubmission.
pub fn check_content(title: &str, description: &str) -> Result<(), LifecycleError> {
    if title.trim().is_empty() {
        return Err(LifecycleError::EmptyTitle);
    }
    if title.chars().count() > MAX_TITLE_LEN {
        return Err(LifecycleError::TitleTooLong);
    }
    if description.trim().is_empty() {
        return Err(LifecycleError::EmptyDescription);
    }
    Ok(())
}

/// Entry point of the lifecycle: every request starts submitted and
/// pending. Grade inquiries must name a grade type and a handler; the
/// handler role is derived from the grade type. Other types submit
/// unrouted and get a handler at validation time.
pub fn submit(
    request_type: RequestType,
    grade_type: Option<GradeType>,
    routed_to: Option<i32>,
) -> Result<Submission, LifecycleError> {
    let (routed_to, routed_to_role, events) = if request_type == RequestType::GradeInquiry {
        let grade_type = grade_type.ok_or(LifecycleError::MissingGradeType)?;
        let handler_id = routed_to.ok_or(LifecycleError::MissingHandler)?;
        (
            Some(handler_id),
            Some(handler_role_for(grade_type).to_string()),
            vec![TransitionEvent::AssignedToHandler { handler_id }],
        )
    } else {
        (None, None, Vec::new())
    };

    Ok(Submission {
        status: RequestStatus::Submitted,
        validation_status: ValidationStatus::Pending,
        routed_to,
        routed_to_role,
        events,
    })
}

/// Admin approves the conformity gate. Routing set at submission is
/// immutable: supplying new routing for an already-routed request is a
/// hard error, not a silent overwrite.
pub fn approve_validation(
    request: &Request,
    routing: Option<Routing>,
) -> Result<Transition, LifecycleError> {
    if request.validation_status != ValidationStatus::Pending {
        return Err(LifecycleError::NotPending);
    }

    let mut patch = RequestPatch {
        validation_status: Some(ValidationStatus::Validated),
        ..Default::default()
    };
    let mut events = Vec::new();

    match (request.routed_to, routing) {
        (Some(_), Some(_)) => return Err(LifecycleError::AlreadyRouted),
        (Some(_), None) => {
            patch.status = Some(RequestStatus::Assigned);
        }
        (None, Some(routing)) => {
            patch.status = Some(RequestStatus::Assigned);
            patch.routed_to = Some(routing.handler_id);
            patch.routed_to_role = Some(routing.handler_role);
            events.push(TransitionEvent::AssignedToHandler {
                handler_id: routing.handler_id,
            });
        }
        (None, None) => {
            patch.status = Some(RequestStatus::Validated);
        }
    }

    // Auto-validated subtypes were already presumed conformant at
    // submission; confirming them re-notifies nobody.
    if !presumed_validated(request.request_type, request.grade_type) {
        events.push(TransitionEvent::ValidationApproved {
            creator_id: request.created_by,
        });
    }

    Ok(Transition { patch, events })
}

/// Admin rejects at the conformity gate. Requires a non-blank reason;
/// the request becomes resubmittable by its creator.
pub fn reject_validation(request: &Request, reason: &str) -> Result<Transition, LifecycleError> {
    if request.validation_status != ValidationStatus::Pending {
        return Err(LifecycleError::NotPending);
    }
    let reason = non_blank(Some(reason)).ok_or(LifecycleError::MissingReason)?;

    Ok(Transition {
        patch: RequestPatch {
            status: Some(RequestStatus::Rejected),
            validation_status: Some(ValidationStatus::Rejected),
            rejection_reason: Some(Some(reason.to_string())),
            ..Default::default()
        },
        events: vec![TransitionEvent::ValidationRejected {
            creator_id: request.created_by,
            reason: reason.to_string(),
        }],
    })
}

/// Creator resubmits after a validation rejection, optionally editing
/// title/description. Handler rejections are terminal: a request that
/// carries a final_status never re-enters the lifecycle.
pub fn resubmit(
    request: &Request,
    title: Option<String>,
    description: Option<String>,
) -> Result<Transition, LifecycleError> {
    if request.final_status.is_some() {
        return Err(LifecycleError::Terminal);
    }
    if request.validation_status != ValidationStatus::Rejected {
        return Err(LifecycleError::NotRejected);
    }

    let new_title = title.unwrap_or_else(|| request.title.clone());
    let new_description = description.unwrap_or_else(|| request.description.clone());
    check_content(&new_title, &new_description)?;

    Ok(Transition {
        patch: RequestPatch {
            status: Some(RequestStatus::Submitted),
            validation_status: Some(ValidationStatus::Pending),
            rejection_reason: Some(None),
            title: Some(new_title),
            description: Some(new_description),
            ..Default::default()
        },
        events: Vec::new(),
    })
}

/// Routed handler marks the request as being worked on.
pub fn start_processing(request: &Request) -> Result<Transition, LifecycleError> {
    if request.validation_status != ValidationStatus::Validated {
        return Err(LifecycleError::NotValidated);
    }
    if !matches!(
        request.status,
        RequestStatus::Validated | RequestStatus::Assigned
    ) {
        return Err(LifecycleError::Terminal);
    }

    Ok(Transition {
        patch: RequestPatch {
            status: Some(RequestStatus::Processing),
            ..Default::default()
        },
        events: Vec::new(),
    })
}

fn check_treatable(request: &Request) -> Result<(), LifecycleError> {
    if request.validation_status != ValidationStatus::Validated {
        return Err(LifecycleError::NotValidated);
    }
    if request.final_status.is_some() || request.status.is_terminal() {
        return Err(LifecycleError::Terminal);
    }
    Ok(())
}

/// Routed handler approves: the request completes and the resolution
/// audit fields are stamped in the same patch.
pub fn approve_treatment(
    request: &Request,
    handler_id: i32,
    comment: Option<&str>,
    now: NaiveDateTime,
) -> Result<Transition, LifecycleError> {
    check_treatable(request)?;

    Ok(Transition {
        patch: RequestPatch {
            status: Some(RequestStatus::Completed),
            final_status: Some(Some(FinalStatus::Approved)),
            final_comment: non_blank(comment).map(str::to_string),
            resolved_at: Some(Some(now)),
            resolved_by: Some(Some(handler_id)),
            ..Default::default()
        },
        events: vec![TransitionEvent::TreatmentApproved {
            creator_id: request.created_by,
        }],
    })
}

/// Routed handler rejects with a mandatory comment. Terminal: there is
/// no resubmission path after a handler rejection.
pub fn reject_treatment(request: &Request, comment: &str) -> Result<Transition, LifecycleError> {
    check_treatable(request)?;
    let comment = non_blank(Some(comment)).ok_or(LifecycleError::MissingComment)?;

    Ok(Transition {
        patch: RequestPatch {
            status: Some(RequestStatus::Rejected),
            final_status: Some(Some(FinalStatus::Rejected)),
            final_comment: Some(comment.to_string()),
            ..Default::default()
        },
        events: vec![TransitionEvent::TreatmentRejected {
            creator_id: request.created_by,
            comment: comment.to_string(),
        }],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn request(
        request_type: RequestType,
        status: RequestStatus,
        validation_status: ValidationStatus,
    ) -> Request {
        let now = Utc::now().naive_utc();
        Request {
            id: 1,
            request_type,
            grade_type: None,
            issue_subcategory: None,
            title: "Demande d'attestation".to_string(),
            description: "Attestation de scolarité pour dossier de bourse".to_string(),
            status,
            validation_status,
            final_status: None,
            routed_to: None,
            routed_to_role: None,
            rejection_reason: None,
            final_comment: None,
            created_by: 7,
            created_at: now,
            updated_at: now,
            resolved_at: None,
            resolved_by: None,
        }
    }

    fn grade_inquiry(handler_id: i32) -> Request {
        let mut req = request(
            RequestType::GradeInquiry,
            RequestStatus::Submitted,
            ValidationStatus::Pending,
        );
        req.grade_type = Some(GradeType::Cc);
        req.routed_to = Some(handler_id);
        req.routed_to_role = Some(roles::TEACHER.to_string());
        req
    }

    #[test]
    fn submit_grade_inquiry_routes_to_chosen_handler() {
        let sub = submit(RequestType::GradeInquiry, Some(GradeType::Cc), Some(42)).unwrap();
        assert_eq!(sub.status, RequestStatus::Submitted);
        assert_eq!(sub.validation_status, ValidationStatus::Pending);
        assert_eq!(sub.routed_to, Some(42));
        assert_eq!(sub.routed_to_role.as_deref(), Some(roles::TEACHER));
        assert_eq!(
            sub.events,
            vec![TransitionEvent::AssignedToHandler { handler_id: 42 }]
        );
    }

    #[test]
    fn submit_sn_inquiry_routes_to_department_head() {
        let sub = submit(RequestType::GradeInquiry, Some(GradeType::Sn), Some(9)).unwrap();
        assert_eq!(sub.routed_to_role.as_deref(), Some(roles::DEPARTMENT_HEAD));
    }

    #[test]
    fn submit_grade_inquiry_requires_grade_type_and_handler() {
        assert_eq!(
            submit(RequestType::GradeInquiry, None, Some(42)).unwrap_err(),
            LifecycleError::MissingGradeType
        );
        assert_eq!(
            submit(RequestType::GradeInquiry, Some(GradeType::Cc), None).unwrap_err(),
            LifecycleError::MissingHandler
        );
    }

    #[test]
    fn submit_other_types_start_unrouted() {
        let sub = submit(RequestType::CertificateRequest, None, None).unwrap();
        assert_eq!(sub.routed_to, None);
        assert_eq!(sub.routed_to_role, None);
        assert!(sub.events.is_empty());
    }

    #[test]
    fn validation_approval_keeps_requester_routing() {
        let req = grade_inquiry(42);
        let t = approve_validation(&req, None).unwrap();
        assert_eq!(t.patch.validation_status, Some(ValidationStatus::Validated));
        assert_eq!(t.patch.status, Some(RequestStatus::Assigned));
        // routed_to untouched: the validator's patch never carries it.
        assert_eq!(t.patch.routed_to, None);
        assert_eq!(t.patch.routed_to_role, None);
    }

    #[test]
    fn validation_approval_rejects_rerouting_an_already_routed_request() {
        let req = grade_inquiry(42);
        let err = approve_validation(
            &req,
            Some(Routing {
                handler_id: 99,
                handler_role: roles::TEACHER.to_string(),
            }),
        )
        .unwrap_err();
        assert_eq!(err, LifecycleError::AlreadyRouted);
    }

    #[test]
    fn validation_approval_can_route_an_unrouted_request() {
        let req = request(
            RequestType::CertificateRequest,
            RequestStatus::Submitted,
            ValidationStatus::Pending,
        );
        let t = approve_validation(
            &req,
            Some(Routing {
                handler_id: 5,
                handler_role: roles::TEACHER.to_string(),
            }),
        )
        .unwrap();
        assert_eq!(t.patch.status, Some(RequestStatus::Assigned));
        assert_eq!(t.patch.routed_to, Some(5));
        assert!(t
            .events
            .contains(&TransitionEvent::AssignedToHandler { handler_id: 5 }));
    }

    #[test]
    fn validation_approval_without_routing_stays_validated() {
        let req = request(
            RequestType::Other,
            RequestStatus::Submitted,
            ValidationStatus::Pending,
        );
        let t = approve_validation(&req, None).unwrap();
        assert_eq!(t.patch.status, Some(RequestStatus::Validated));
        assert_eq!(
            t.events,
            vec![TransitionEvent::ValidationApproved { creator_id: 7 }]
        );
    }

    #[test]
    fn auto_validated_grade_inquiry_confirmation_is_silent_for_creator() {
        let req = grade_inquiry(42);
        let t = approve_validation(&req, None).unwrap();
        assert!(!t.events.iter().any(|e| matches!(
            e,
            TransitionEvent::ValidationApproved { .. }
        )));
    }

    #[test]
    fn validation_rejection_requires_non_blank_reason() {
        let req = request(
            RequestType::AbsenceJustification,
            RequestStatus::Submitted,
            ValidationStatus::Pending,
        );
        assert_eq!(
            reject_validation(&req, "").unwrap_err(),
            LifecycleError::MissingReason
        );
        assert_eq!(
            reject_validation(&req, "   ").unwrap_err(),
            LifecycleError::MissingReason
        );
    }

    #[test]
    fn validation_rejection_notifies_creator_with_reason() {
        let req = request(
            RequestType::AbsenceJustification,
            RequestStatus::Submitted,
            ValidationStatus::Pending,
        );
        let t = reject_validation(&req, "document illisible").unwrap();
        assert_eq!(t.patch.validation_status, Some(ValidationStatus::Rejected));
        assert_eq!(t.patch.status, Some(RequestStatus::Rejected));
        assert_eq!(
            t.patch.rejection_reason,
            Some(Some("document illisible".to_string()))
        );
        assert_eq!(
            t.events,
            vec![TransitionEvent::ValidationRejected {
                creator_id: 7,
                reason: "document illisible".to_string(),
            }]
        );
    }

    #[test]
    fn validation_cannot_run_twice() {
        let mut req = request(
            RequestType::Other,
            RequestStatus::Validated,
            ValidationStatus::Validated,
        );
        assert_eq!(
            approve_validation(&req, None).unwrap_err(),
            LifecycleError::NotPending
        );
        req.validation_status = ValidationStatus::Rejected;
        assert_eq!(
            reject_validation(&req, "raison").unwrap_err(),
            LifecycleError::NotPending
        );
    }

    #[test]
    fn resubmission_resets_gate_and_clears_reason() {
        let mut req = request(
            RequestType::CertificateRequest,
            RequestStatus::Rejected,
            ValidationStatus::Rejected,
        );
        req.rejection_reason = Some("document illisible".to_string());

        let t = resubmit(&req, Some("Nouvelle demande".to_string()), None).unwrap();
        assert_eq!(t.patch.status, Some(RequestStatus::Submitted));
        assert_eq!(t.patch.validation_status, Some(ValidationStatus::Pending));
        assert_eq!(t.patch.rejection_reason, Some(None));
        assert_eq!(t.patch.title.as_deref(), Some("Nouvelle demande"));
        assert!(t.events.is_empty());
    }

    #[test]
    fn resubmission_requires_validation_rejection() {
        let req = request(
            RequestType::CertificateRequest,
            RequestStatus::Submitted,
            ValidationStatus::Pending,
        );
        assert_eq!(
            resubmit(&req, None, None).unwrap_err(),
            LifecycleError::NotRejected
        );
    }

    #[test]
    fn handler_rejection_is_terminal_for_resubmission() {
        let mut req = request(
            RequestType::GradeInquiry,
            RequestStatus::Rejected,
            ValidationStatus::Validated,
        );
        req.final_status = Some(FinalStatus::Rejected);
        assert_eq!(
            resubmit(&req, None, None).unwrap_err(),
            LifecycleError::Terminal
        );
    }

    #[test]
    fn treatment_requires_validation_first() {
        let req = request(
            RequestType::Other,
            RequestStatus::Submitted,
            ValidationStatus::Pending,
        );
        let now = Utc::now().naive_utc();
        assert_eq!(
            approve_treatment(&req, 42, None, now).unwrap_err(),
            LifecycleError::NotValidated
        );
        assert_eq!(
            reject_treatment(&req, "non conforme").unwrap_err(),
            LifecycleError::NotValidated
        );
    }

    #[test]
    fn treatment_approval_completes_and_stamps_resolution() {
        let mut req = grade_inquiry(42);
        req.status = RequestStatus::Assigned;
        req.validation_status = ValidationStatus::Validated;

        let now = Utc::now().naive_utc();
        let t = approve_treatment(&req, 42, Some("conforme"), now).unwrap();
        assert_eq!(t.patch.status, Some(RequestStatus::Completed));
        assert_eq!(t.patch.final_status, Some(Some(FinalStatus::Approved)));
        assert_eq!(t.patch.final_comment.as_deref(), Some("conforme"));
        assert_eq!(t.patch.resolved_at, Some(Some(now)));
        assert_eq!(t.patch.resolved_by, Some(Some(42)));
        assert_eq!(
            t.events,
            vec![TransitionEvent::TreatmentApproved { creator_id: 7 }]
        );
    }

    #[test]
    fn treatment_rejection_requires_comment_and_is_terminal() {
        let mut req = grade_inquiry(42);
        req.status = RequestStatus::Processing;
        req.validation_status = ValidationStatus::Validated;

        assert_eq!(
            reject_treatment(&req, " ").unwrap_err(),
            LifecycleError::MissingComment
        );

        let t = reject_treatment(&req, "justificatif manquant").unwrap();
        assert_eq!(t.patch.status, Some(RequestStatus::Rejected));
        assert_eq!(t.patch.final_status, Some(Some(FinalStatus::Rejected)));
        // No resolution stamps outside completion.
        assert_eq!(t.patch.resolved_at, None);
        assert_eq!(t.patch.resolved_by, None);

        req.final_status = Some(FinalStatus::Rejected);
        req.status = RequestStatus::Rejected;
        assert_eq!(
            reject_treatment(&req, "encore").unwrap_err(),
            LifecycleError::Terminal
        );
    }

    #[test]
    fn final_status_only_ever_set_on_validated_requests() {
        // The engine can only emit a final_status patch out of
        // check_treatable, which demands validation_status == validated.
        for vs in [ValidationStatus::Pending, ValidationStatus::Rejected] {
            let req = request(RequestType::Other, RequestStatus::Submitted, vs);
            let now = Utc::now().naive_utc();
            assert!(approve_treatment(&req, 1, None, now).is_err());
            assert!(reject_treatment(&req, "motif").is_err());
        }
    }

    #[test]
    fn resolution_stamps_appear_only_with_completion() {
        let mut req = grade_inquiry(42);
        req.validation_status = ValidationStatus::Validated;
        req.status = RequestStatus::Assigned;
        let now = Utc::now().naive_utc();

        let approve = approve_treatment(&req, 42, None, now).unwrap();
        assert_eq!(approve.patch.status, Some(RequestStatus::Completed));
        assert!(approve.patch.resolved_at.is_some());

        let reject = reject_treatment(&req, "hors délai").unwrap();
        assert_ne!(reject.patch.status, Some(RequestStatus::Completed));
        assert_eq!(reject.patch.resolved_at, None);
    }

    #[test]
    fn start_processing_needs_an_assigned_validated_request() {
        let mut req = grade_inquiry(42);
        req.validation_status = ValidationStatus::Validated;
        req.status = RequestStatus::Assigned;
        let t = start_processing(&req).unwrap();
        assert_eq!(t.patch.status, Some(RequestStatus::Processing));

        req.status = RequestStatus::Completed;
        assert_eq!(start_processing(&req).unwrap_err(), LifecycleError::Terminal);

        req.validation_status = ValidationStatus::Pending;
        req.status = RequestStatus::Submitted;
        assert_eq!(
            start_processing(&req).unwrap_err(),
            LifecycleError::NotValidated
        );
    }

    #[test]
    fn content_checks_bound_title_and_description() {
        assert_eq!(
            check_content("", "desc").unwrap_err(),
            LifecycleError::EmptyTitle
        );
        assert_eq!(
            check_content(&"x".repeat(MAX_TITLE_LEN + 1), "desc").unwrap_err(),
            LifecycleError::TitleTooLong
        );
        assert_eq!(
            check_content("titre", "  ").unwrap_err(),
            LifecycleError::EmptyDescription
        );
        assert!(check_content("titre", "desc").is_ok());
    }

    #[test]
    fn transitions_carry_events_as_data_only() {
        // Dropping the events (a failed notification insert) leaves the
        // patch intact: delivery cannot alter the state change.
        let req = request(
            RequestType::Other,
            RequestStatus::Submitted,
            ValidationStatus::Pending,
        );
        let t = reject_validation(&req, "document illisible").unwrap();
        let patch_before = t.patch.clone();
        let Transition { patch, events } = t;
        drop(events);
        assert_eq!(patch, patch_before);
    }
}
