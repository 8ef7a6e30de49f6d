//! Company, share class, shareholder and membership rows.
//!
//! These belong to the wider cap-table system; the option pool only reads
//! them for scoping and authorization. The insert methods exist so the
//! binary and tests can seed a database.

use std::fmt;
use std::str::FromStr;

use anyhow::{Context, Result};
use rusqlite::{OptionalExtension, Row, params};
use rust_decimal::Decimal;

use optionpool_types::{CompanyId, ShareClassId, ShareholderId, UnknownVariant, UserId};

use crate::sqlite_util::{decimal_col, decimal_to_sql, opt_parsed_col, parsed_col};
use crate::store::{Reader, UnitOfWork};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompanyStatus {
    Active,
    Inactive,
}

impl CompanyStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "ACTIVE",
            Self::Inactive => "INACTIVE",
        }
    }
}

impl FromStr for CompanyStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ACTIVE" => Ok(Self::Active),
            "INACTIVE" => Ok(Self::Inactive),
            other => Err(UnknownVariant::new("company status", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberRole {
    Admin,
    Member,
}

impl MemberRole {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "ADMIN",
            Self::Member => "MEMBER",
        }
    }
}

impl fmt::Display for MemberRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MemberRole {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ADMIN" => Ok(Self::Admin),
            "MEMBER" => Ok(Self::Member),
            other => Err(UnknownVariant::new("member role", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompanyRecord {
    pub id: CompanyId,
    pub name: String,
    pub status: CompanyStatus,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ShareClassRecord {
    pub id: ShareClassId,
    pub company_id: CompanyId,
    pub name: String,
    pub total_issued: Decimal,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ShareholderRecord {
    pub id: ShareholderId,
    pub company_id: CompanyId,
    pub name: String,
    pub user_id: Option<UserId>,
}

fn company_from_row(row: &Row<'_>) -> rusqlite::Result<CompanyRecord> {
    Ok(CompanyRecord {
        id: parsed_col(row, 0)?,
        name: row.get(1)?,
        status: parsed_col(row, 2)?,
    })
}

fn share_class_from_row(row: &Row<'_>) -> rusqlite::Result<ShareClassRecord> {
    Ok(ShareClassRecord {
        id: parsed_col(row, 0)?,
        company_id: parsed_col(row, 1)?,
        name: row.get(2)?,
        total_issued: decimal_col(row, 3)?,
    })
}

fn shareholder_from_row(row: &Row<'_>) -> rusqlite::Result<ShareholderRecord> {
    Ok(ShareholderRecord {
        id: parsed_col(row, 0)?,
        company_id: parsed_col(row, 1)?,
        name: row.get(2)?,
        user_id: opt_parsed_col(row, 3)?,
    })
}

impl Reader<'_> {
    pub fn company(&self, id: CompanyId) -> Result<Option<CompanyRecord>> {
        self.conn
            .query_row(
                "SELECT id, name, status FROM companies WHERE id = ?1",
                [id.to_string()],
                company_from_row,
            )
            .optional()
            .with_context(|| format!("Failed to load company {id}"))
    }

    pub fn share_class(&self, id: ShareClassId) -> Result<Option<ShareClassRecord>> {
        self.conn
            .query_row(
                "SELECT id, company_id, name, total_issued FROM share_classes WHERE id = ?1",
                [id.to_string()],
                share_class_from_row,
            )
            .optional()
            .with_context(|| format!("Failed to load share class {id}"))
    }

    pub fn shareholder(&self, id: ShareholderId) -> Result<Option<ShareholderRecord>> {
        self.conn
            .query_row(
                "SELECT id, company_id, name, user_id FROM shareholders WHERE id = ?1",
                [id.to_string()],
                shareholder_from_row,
            )
            .optional()
            .with_context(|| format!("Failed to load shareholder {id}"))
    }

    pub fn member_role(&self, company_id: CompanyId, user_id: UserId) -> Result<Option<MemberRole>> {
        self.conn
            .query_row(
                "SELECT role FROM company_members WHERE company_id = ?1 AND user_id = ?2",
                [company_id.to_string(), user_id.to_string()],
                |row| parsed_col(row, 0),
            )
            .optional()
            .with_context(|| format!("Failed to load membership of {user_id} in {company_id}"))
    }
}

impl UnitOfWork<'_> {
    pub fn insert_company(&self, company: &CompanyRecord) -> Result<()> {
        self.conn()
            .execute(
                "INSERT INTO companies (id, name, status) VALUES (?1, ?2, ?3)",
                params![
                    company.id.to_string(),
                    &company.name,
                    company.status.as_str()
                ],
            )
            .with_context(|| format!("Failed to insert company {}", company.id))?;
        Ok(())
    }

    pub fn insert_share_class(&self, share_class: &ShareClassRecord) -> Result<()> {
        self.conn()
            .execute(
                "INSERT INTO share_classes (id, company_id, name, total_issued)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    share_class.id.to_string(),
                    share_class.company_id.to_string(),
                    &share_class.name,
                    decimal_to_sql(share_class.total_issued)
                ],
            )
            .with_context(|| format!("Failed to insert share class {}", share_class.id))?;
        Ok(())
    }

    pub fn insert_shareholder(&self, shareholder: &ShareholderRecord) -> Result<()> {
        self.conn()
            .execute(
                "INSERT INTO shareholders (id, company_id, name, user_id) VALUES (?1, ?2, ?3, ?4)",
                params![
                    shareholder.id.to_string(),
                    shareholder.company_id.to_string(),
                    &shareholder.name,
                    shareholder.user_id.map(|id| id.to_string())
                ],
            )
            .with_context(|| format!("Failed to insert shareholder {}", shareholder.id))?;
        Ok(())
    }

    pub fn upsert_member(&self, company_id: CompanyId, user_id: UserId, role: MemberRole) -> Result<()> {
        self.conn()
            .execute(
                "INSERT INTO company_members (company_id, user_id, role) VALUES (?1, ?2, ?3)
                 ON CONFLICT(company_id, user_id) DO UPDATE SET role = ?3",
                params![company_id.to_string(), user_id.to_string(), role.as_str()],
            )
            .with_context(|| format!("Failed to upsert membership of {user_id} in {company_id}"))?;
        Ok(())
    }
}
