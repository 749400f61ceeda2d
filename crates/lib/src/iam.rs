//! Roles, policies and permission attachment.

use std::cell::RefCell;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::debug;

use crate::construct::{Resource, ScopePath, Stack};
use crate::error::SynthError;

const POLICY_VERSION: &str = "2012-10-17";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Effect {
  #[default]
  Allow,
  Deny,
}

/// One IAM policy statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyStatement {
  #[serde(rename = "Effect", default)]
  pub effect: Effect,
  #[serde(rename = "Action")]
  pub actions: Vec<String>,
  #[serde(rename = "Resource")]
  pub resources: Vec<String>,
}

impl PolicyStatement {
  pub fn allow<A, R>(actions: A, resources: R) -> Self
  where
    A: IntoIterator,
    A::Item: Into<String>,
    R: IntoIterator,
    R::Item: Into<String>,
  {
    Self {
      effect: Effect::Allow,
      actions: actions.into_iter().map(Into::into).collect(),
      resources: resources.into_iter().map(Into::into).collect(),
    }
  }
}

/// A single entry of a permission list.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum Permission {
  /// A service name (`"s3"`, granting `s3:*`) or a full action (`"s3:GetObject"`).
  Action(String),
  Statement(PolicyStatement),
}

impl Permission {
  fn to_statement(&self) -> Result<PolicyStatement, SynthError> {
    match self {
      Permission::Statement(statement) => Ok(statement.clone()),
      Permission::Action(action) => {
        let action = action.trim();
        if action.is_empty() || action.chars().any(char::is_whitespace) {
          return Err(SynthError::InvalidPermission(action.to_string()));
        }
        let action = if action.contains(':') {
          action.to_string()
        } else {
          format!("{action}:*")
        };
        Ok(PolicyStatement::allow([action], ["*"]))
      }
    }
  }
}

/// Permissions granted to a function role: everything (`"*"`) or a list.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "RawPermissions")]
pub enum Permissions {
  All,
  List(Vec<Permission>),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawPermissions {
  Wildcard(String),
  List(Vec<Permission>),
}

impl TryFrom<RawPermissions> for Permissions {
  type Error = String;

  fn try_from(raw: RawPermissions) -> Result<Self, Self::Error> {
    match raw {
      RawPermissions::Wildcard(s) if s == "*" => Ok(Permissions::All),
      RawPermissions::Wildcard(s) => Err(format!("expected \"*\" or a list of permissions, got \"{s}\"")),
      RawPermissions::List(list) => Ok(Permissions::List(list)),
    }
  }
}

/// An IAM role resource with a lazily created inline default policy.
pub struct Role {
  resource: Rc<Resource>,
  policy: RefCell<Option<Rc<Resource>>>,
  statements: RefCell<Vec<PolicyStatement>>,
}

impl Role {
  /// Declare a role at `path`, assumable by the given service principals.
  pub fn new(
    stack: &Stack,
    path: ScopePath,
    principals: &[&str],
    managed_policy_arns: Vec<String>,
  ) -> Result<Rc<Role>, SynthError> {
    let mut props = Map::new();
    props.insert(
      "AssumeRolePolicyDocument".to_string(),
      json!({
        "Version": POLICY_VERSION,
        "Statement": [{
          "Action": "sts:AssumeRole",
          "Effect": "Allow",
          "Principal": { "Service": principals },
        }],
      }),
    );
    if !managed_policy_arns.is_empty() {
      props.insert("ManagedPolicyArns".to_string(), json!(managed_policy_arns));
    }

    let resource = stack.add_resource(path, "AWS::IAM::Role", props)?;
    Ok(Rc::new(Role {
      resource,
      policy: RefCell::new(None),
      statements: RefCell::new(Vec::new()),
    }))
  }

  pub fn resource(&self) -> &Rc<Resource> {
    &self.resource
  }

  pub fn path(&self) -> &ScopePath {
    self.resource.path()
  }

  /// Token for the role ARN.
  pub fn arn(&self) -> String {
    self.resource.att("Arn")
  }

  /// The default policy, once a statement has been added.
  pub fn default_policy(&self) -> Option<Rc<Resource>> {
    self.policy.borrow().clone()
  }

  pub fn statements(&self) -> Vec<PolicyStatement> {
    self.statements.borrow().clone()
  }

  /// Append a statement to the role's default policy, creating the policy
  /// resource on first use.
  pub fn add_to_policy(&self, stack: &Stack, statement: PolicyStatement) -> Result<(), SynthError> {
    let mut statements = self.statements.borrow().clone();
    statements.push(statement);
    let document = json!({ "Version": POLICY_VERSION, "Statement": statements });

    let existing = self.policy.borrow().clone();
    match existing {
      Some(policy) => policy.set_property("PolicyDocument", document)?,
      None => {
        let path = self.path().child("DefaultPolicy")?;
        let mut props = Map::new();
        props.insert("PolicyName".to_string(), Value::String(path.logical_id()));
        props.insert("PolicyDocument".to_string(), document);
        props.insert("Roles".to_string(), json!([self.resource.ref_token()]));
        let policy = stack.add_resource(path, "AWS::IAM::Policy", props)?;
        *self.policy.borrow_mut() = Some(policy);
      }
    }

    debug!(role = %self.path(), statements = statements.len(), "updated role policy");
    *self.statements.borrow_mut() = statements;
    Ok(())
  }
}

impl std::fmt::Debug for Role {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Role").field("path", &self.path().to_string()).finish()
  }
}

/// Allow `grantee` to pass `role` to a service.
pub fn grant_pass_role(stack: &Stack, role: &Role, grantee: &Role) -> Result<(), SynthError> {
  grantee.add_to_policy(stack, PolicyStatement::allow(["iam:PassRole"], [role.arn()]))
}

pub fn attach_permissions_to_role(stack: &Stack, role: &Role, permissions: &Permissions) -> Result<(), SynthError> {
  match permissions {
    Permissions::All => role.add_to_policy(stack, PolicyStatement::allow(["*"], ["*"])),
    Permissions::List(list) => {
      for permission in list {
        role.add_to_policy(stack, permission.to_statement()?)?;
      }
      Ok(())
    }
  }
}
