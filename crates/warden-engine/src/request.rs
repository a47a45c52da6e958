//! Admission requests as seen by the rule chains

use kube::api::DynamicObject;
use kube::core::admission::{AdmissionRequest, Operation as KubeOperation};
use warden_core::Identity;
use warden_kube::{AdmissionError, CustomObject, ResourceKind, Result};

/// Requested operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Create,
    Update,
    Delete,
    Connect,
}

impl From<&KubeOperation> for Operation {
    fn from(op: &KubeOperation) -> Self {
        match op {
            KubeOperation::Create => Operation::Create,
            KubeOperation::Update => Operation::Update,
            KubeOperation::Delete => Operation::Delete,
            KubeOperation::Connect => Operation::Connect,
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Operation::Create => write!(f, "CREATE"),
            Operation::Update => write!(f, "UPDATE"),
            Operation::Delete => write!(f, "DELETE"),
            Operation::Connect => write!(f, "CONNECT"),
        }
    }
}

/// One admission request, decoded for a known resource kind
#[derive(Debug, Clone)]
pub struct ReviewRequest {
    pub uid: String,
    pub kind: ResourceKind,
    pub operation: Operation,
    pub object: Option<CustomObject>,
    pub old_object: Option<CustomObject>,
    pub dry_run: bool,
    pub user: Identity,
}

impl ReviewRequest {
    pub fn new(kind: ResourceKind, operation: Operation, object: CustomObject) -> Self {
        Self {
            uid: String::new(),
            kind,
            operation,
            object: Some(object),
            old_object: None,
            dry_run: false,
            user: Identity::default(),
        }
    }

    pub fn with_uid(mut self, uid: impl Into<String>) -> Self {
        self.uid = uid.into();
        self
    }

    pub fn with_old_object(mut self, old: CustomObject) -> Self {
        self.old_object = Some(old);
        self
    }

    pub fn with_user(mut self, user: Identity) -> Self {
        self.user = user;
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Decode an API server request
    ///
    /// Fails for kinds outside the supported set and for objects that cannot
    /// be decoded.
    pub fn from_admission(request: &AdmissionRequest<DynamicObject>) -> Result<Self> {
        let kind = ResourceKind::from_group_kind(&request.kind.group, &request.kind.kind)
            .filter(ResourceKind::is_admitted)
            .ok_or_else(|| {
                AdmissionError::not_allowed(format!(
                    "resource kind {}/{} is not supported",
                    request.kind.group, request.kind.kind
                ))
            })?;

        let user = Identity {
            username: request.user_info.username.clone().unwrap_or_default(),
            groups: request.user_info.groups.clone().unwrap_or_default(),
        };

        Ok(Self {
            uid: request.uid.clone(),
            kind,
            operation: Operation::from(&request.operation),
            object: request
                .object
                .clone()
                .map(|obj| CustomObject::new(kind, obj))
                .transpose()?,
            old_object: request
                .old_object
                .clone()
                .map(|obj| CustomObject::new(kind, obj))
                .transpose()?,
            dry_run: request.dry_run,
            user,
        })
    }

    /// The object being admitted
    pub fn object(&self) -> Result<&CustomObject> {
        self.object.as_ref().ok_or_else(|| {
            AdmissionError::ParsingFailed(format!(
                "{} request for {} does not contain an object",
                self.operation, self.kind
            ))
        })
    }

    /// The previous state of the object, update requests only
    pub fn old_object(&self) -> Result<&CustomObject> {
        self.old_object.as_ref().ok_or_else(|| {
            AdmissionError::ParsingFailed(format!(
                "{} request for {} does not contain the old object",
                self.operation, self.kind
            ))
        })
    }
}
