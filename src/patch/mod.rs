//! Diff-driven patch construction.
//!
//! [`PatchDiffBuilder`] turns the fields a caller explicitly set into an
//! ordered list of JSON-patch operations against the observed version.
//! The op is chosen by presence alone: `add` when the observed version
//! lacks the field, `replace` when it has it. Values are never compared;
//! callers only put changed fields into [`DesiredFields`].

use std::collections::BTreeMap;
use std::fmt;

use serde_json::{Map, Value};

use crate::model::{PatchOperation, VersionRecord};

pub mod normalize;

/// Pointer to the version inside a single-version offering document.
pub const VERSION_ROOT: &str = "/kinds/0/versions/0";

/// Version attributes the orchestrator manages through patches.
///
/// Declaration order is the order operations are emitted in. It follows
/// the document layout: container-level fields come before the fields
/// that reference them, and metadata entries come after the top-level
/// install definitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ManagedField {
    Flavor,
    Tags,
    Configuration,
    IamPermissions,
    RequiredResources,
    Install,
    PreInstall,
    Licenses,
    SolutionInfo,
    Usage,
    TerraformVersion,
    LongDescription,
}

impl ManagedField {
    pub const ALL: [ManagedField; 12] = [
        Self::Flavor,
        Self::Tags,
        Self::Configuration,
        Self::IamPermissions,
        Self::RequiredResources,
        Self::Install,
        Self::PreInstall,
        Self::Licenses,
        Self::SolutionInfo,
        Self::Usage,
        Self::TerraformVersion,
        Self::LongDescription,
    ];

    /// Wire name of the attribute.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Flavor => "flavor",
            Self::Tags => "tags",
            Self::Configuration => "configuration",
            Self::IamPermissions => "iam_permissions",
            Self::RequiredResources => "required_resources",
            Self::Install => "install",
            Self::PreInstall => "pre_install",
            Self::Licenses => "licenses",
            Self::SolutionInfo => "solution_info",
            Self::Usage => "usage",
            Self::TerraformVersion => "terraform_version",
            Self::LongDescription => "long_description",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|field| field.name() == name)
    }

    /// Stored under the version's `metadata` object rather than at top level.
    pub fn is_metadata(&self) -> bool {
        matches!(self, Self::Usage | Self::TerraformVersion)
    }

    /// Patch path relative to [`VERSION_ROOT`].
    pub fn relative_path(&self) -> String {
        if self.is_metadata() {
            format!("/metadata/{}", self.name())
        } else {
            format!("/{}", self.name())
        }
    }

    /// Whether the observed version carries a non-null value for this field.
    pub fn is_present_in(&self, observed: &VersionRecord) -> bool {
        self.observed(observed).is_some_and(|v| !v.is_null())
    }

    fn observed<'a>(&self, record: &'a VersionRecord) -> Option<&'a Value> {
        if self.is_metadata() {
            record.fields.get("metadata")?.get(self.name())
        } else {
            record.fields.get(self.name())
        }
    }

    /// Convert a caller-shaped value into the shape the catalog stores.
    pub fn to_patch_value(&self, value: Value) -> Value {
        match self {
            Self::Flavor | Self::Install => normalize::unwrap_list_of_one(value),
            Self::Configuration => normalize::configuration_for_patch(value),
            Self::SolutionInfo => normalize::solution_info_for_patch(value),
            _ => value,
        }
    }

    /// Inverse of [`ManagedField::to_patch_value`].
    pub fn to_display_value(&self, value: Value) -> Value {
        match self {
            Self::Flavor | Self::Install => normalize::wrap_list_of_one(value),
            Self::Configuration => normalize::configuration_for_display(value),
            Self::SolutionInfo => normalize::solution_info_for_display(value),
            _ => value,
        }
    }
}

impl fmt::Display for ManagedField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Fields the caller explicitly set, in caller shape.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DesiredFields {
    values: BTreeMap<ManagedField, Value>,
}

impl DesiredFields {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, field: ManagedField, value: Value) {
        self.values.insert(field, value);
    }

    pub fn with(mut self, field: ManagedField, value: Value) -> Self {
        self.set(field, value);
        self
    }

    pub fn get(&self, field: ManagedField) -> Option<&Value> {
        self.values.get(&field)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Fields in emission order.
    pub fn iter(&self) -> impl Iterator<Item = (ManagedField, &Value)> {
        self.values.iter().map(|(field, value)| (*field, value))
    }
}

/// Builds the patch for one version. Pure; safe to share across tasks.
#[derive(Debug, Clone)]
pub struct PatchDiffBuilder {
    root: String,
}

impl Default for PatchDiffBuilder {
    fn default() -> Self {
        Self {
            root: VERSION_ROOT.to_string(),
        }
    }
}

impl PatchDiffBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Root the emitted paths somewhere other than [`VERSION_ROOT`].
    pub fn with_root(root: impl Into<String>) -> Self {
        Self { root: root.into() }
    }

    pub fn build(&self, observed: &VersionRecord, desired: &DesiredFields) -> Vec<PatchOperation> {
        desired
            .iter()
            .map(|(field, value)| {
                let path = format!("{}{}", self.root, field.relative_path());
                let value = field.to_patch_value(value.clone());
                if field.is_present_in(observed) {
                    PatchOperation::replace(path, value)
                } else {
                    PatchOperation::add(path, value)
                }
            })
            .collect()
    }
}

/// Managed fields of a stored version, converted back to caller shape.
pub fn display_fields(record: &VersionRecord) -> Map<String, Value> {
    ManagedField::ALL
        .into_iter()
        .filter_map(|field| {
            let value = field.observed(record)?.clone();
            if value.is_null() {
                return None;
            }
            Some((field.name().to_string(), field.to_display_value(value)))
        })
        .collect()
}
