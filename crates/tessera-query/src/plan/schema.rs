//! Schema mutation and access control plan nodes

use crate::error::{QueryError, Result};
use crate::id::PlanNodeId;
use crate::statement::{AlterType, AuthorStatement, AuthorType, Compressor, DataType, Encoding};
use std::collections::BTreeMap;
use std::str::FromStr;
use tessera_core::PartialPath;

#[derive(Debug, Clone, PartialEq)]
pub struct CreateTimeSeriesNode {
    pub id: PlanNodeId,
    pub path: PartialPath,
    pub data_type: DataType,
    pub encoding: Encoding,
    pub compressor: Compressor,
    pub props: BTreeMap<String, String>,
    pub tags: BTreeMap<String, String>,
    pub attributes: BTreeMap<String, String>,
    pub alias: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreateAlignedTimeSeriesNode {
    pub id: PlanNodeId,
    pub device_path: PartialPath,
    pub measurements: Vec<String>,
    pub data_types: Vec<DataType>,
    pub encodings: Vec<Encoding>,
    pub compressors: Vec<Compressor>,
    pub aliases: Vec<Option<String>>,
    pub tags: Vec<BTreeMap<String, String>>,
    pub attributes: Vec<BTreeMap<String, String>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AlterTimeSeriesNode {
    pub id: PlanNodeId,
    pub path: PartialPath,
    pub alter_type: AlterType,
    pub alter_map: BTreeMap<String, String>,
    pub alias: Option<String>,
    pub tags: BTreeMap<String, String>,
    pub attributes: BTreeMap<String, String>,
}

/// Grantable privileges
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Privilege {
    SetStorageGroup,
    CreateTimeseries,
    InsertTimeseries,
    ReadTimeseries,
    DeleteTimeseries,
    CreateUser,
    DeleteUser,
    ModifyPassword,
    ListUser,
    GrantUserPrivilege,
    RevokeUserPrivilege,
    GrantUserRole,
    RevokeUserRole,
    CreateRole,
    DeleteRole,
    ListRole,
    GrantRolePrivilege,
    RevokeRolePrivilege,
    All,
}

impl FromStr for Privilege {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self> {
        let privilege = match s.to_ascii_uppercase().as_str() {
            "SET_STORAGE_GROUP" => Privilege::SetStorageGroup,
            "CREATE_TIMESERIES" => Privilege::CreateTimeseries,
            "INSERT_TIMESERIES" => Privilege::InsertTimeseries,
            "READ_TIMESERIES" => Privilege::ReadTimeseries,
            "DELETE_TIMESERIES" => Privilege::DeleteTimeseries,
            "CREATE_USER" => Privilege::CreateUser,
            "DELETE_USER" => Privilege::DeleteUser,
            "MODIFY_PASSWORD" => Privilege::ModifyPassword,
            "LIST_USER" => Privilege::ListUser,
            "GRANT_USER_PRIVILEGE" => Privilege::GrantUserPrivilege,
            "REVOKE_USER_PRIVILEGE" => Privilege::RevokeUserPrivilege,
            "GRANT_USER_ROLE" => Privilege::GrantUserRole,
            "REVOKE_USER_ROLE" => Privilege::RevokeUserRole,
            "CREATE_ROLE" => Privilege::CreateRole,
            "DELETE_ROLE" => Privilege::DeleteRole,
            "LIST_ROLE" => Privilege::ListRole,
            "GRANT_ROLE_PRIVILEGE" => Privilege::GrantRolePrivilege,
            "REVOKE_ROLE_PRIVILEGE" => Privilege::RevokeRolePrivilege,
            "ALL" => Privilege::All,
            _ => return Err(QueryError::Auth(format!("No such privilege {}", s))),
        };
        Ok(privilege)
    }
}

/// User and role management request
#[derive(Debug, Clone, PartialEq)]
pub struct AuthorNode {
    pub id: PlanNodeId,
    pub author_type: AuthorType,
    pub user_name: Option<String>,
    pub role_name: Option<String>,
    pub password: Option<String>,
    pub new_password: Option<String>,
    pub privileges: Vec<Privilege>,
    pub node_name: Option<PartialPath>,
}

impl AuthorNode {
    /// Fails with `Auth` when a privilege name is unknown
    pub fn new(id: PlanNodeId, statement: &AuthorStatement) -> Result<Self> {
        let privileges = statement
            .privileges
            .iter()
            .map(|p| p.parse())
            .collect::<Result<Vec<Privilege>>>()?;
        Ok(Self {
            id,
            author_type: statement.author_type,
            user_name: statement.user_name.clone(),
            role_name: statement.role_name.clone(),
            password: statement.password.clone(),
            new_password: statement.new_password.clone(),
            privileges,
            node_name: statement.node_name.clone(),
        })
    }
}
