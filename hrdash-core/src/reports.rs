//! Predefined, parameterized reports
//!
//! Report SQL is fixed at compile time; callers only choose a report by
//! name and supply typed parameter values, which are bound positionally.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::Serialize;
use tracing::{debug, info};

use crate::dataset::Table;
use crate::db::DbPool;
use crate::error::{HrError, Result};
use crate::query::rows_to_table;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamKind {
    /// `YYYY-MM-DD`
    Date,
    Text,
    Integer,
    Number,
}

#[derive(Debug, Clone, Serialize)]
pub struct ParamSpec {
    pub name: &'static str,
    pub kind: ParamKind,
    pub required: bool,
    /// Used when the caller omits the parameter
    pub default: Option<&'static str>,
    pub description: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportDef {
    pub name: &'static str,
    pub title: &'static str,
    pub description: &'static str,
    pub params: &'static [ParamSpec],
    /// Result header, used as-is when the report returns no rows
    pub columns: &'static [&'static str],
    #[serde(skip)]
    pub sql: &'static str,
}

/// A validated parameter value; `None` binds SQL NULL
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Date(Option<NaiveDate>),
    Text(Option<String>),
    Integer(Option<i64>),
    Number(Option<f64>),
}

const AS_OF: ParamSpec = ParamSpec {
    name: "as_of",
    kind: ParamKind::Date,
    required: false,
    default: None,
    description: "Reference date (defaults to today)",
};

const FROM: ParamSpec = ParamSpec {
    name: "from",
    kind: ParamKind::Date,
    required: true,
    default: None,
    description: "First day of the period",
};

const TO: ParamSpec = ParamSpec {
    name: "to",
    kind: ParamKind::Date,
    required: false,
    default: None,
    description: "Last day of the period (defaults to today)",
};

pub static REPORTS: &[ReportDef] = &[
    ReportDef {
        name: "headcount_by_department",
        title: "Headcount by department",
        description: "Active employees per department",
        params: &[],
        columns: &["department", "headcount"],
        sql: r#"
        SELECT COALESCE(department, '(none)') AS department, COUNT(*) AS headcount
        FROM employees
        WHERE status = 'active'
        GROUP BY 1
        ORDER BY headcount DESC, department
        "#,
    },
    ReportDef {
        name: "salary_summary",
        title: "Salary summary",
        description: "Salary range, average and total per department for active employees",
        params: &[],
        columns: &[
            "department",
            "employees",
            "min_salary",
            "avg_salary",
            "max_salary",
            "total_salary",
        ],
        sql: r#"
        SELECT COALESCE(department, '(none)') AS department,
               COUNT(salary) AS employees,
               MIN(salary) AS min_salary,
               ROUND(AVG(salary), 2) AS avg_salary,
               MAX(salary) AS max_salary,
               SUM(salary) AS total_salary
        FROM employees
        WHERE status = 'active'
        GROUP BY 1
        ORDER BY 1
        "#,
    },
    ReportDef {
        name: "new_joiners",
        title: "New joiners",
        description: "Employees who joined within a date range",
        params: &[FROM, TO],
        columns: &[
            "employee_id",
            "full_name",
            "department",
            "designation",
            "date_of_joining",
        ],
        sql: r#"
        SELECT employee_id, full_name, department, designation, date_of_joining
        FROM employees
        WHERE date_of_joining BETWEEN $1::date AND COALESCE($2::date, CURRENT_DATE)
        ORDER BY date_of_joining, employee_id
        "#,
    },
    ReportDef {
        name: "department_roster",
        title: "Department roster",
        description: "Everyone in one department (case-insensitive match)",
        params: &[ParamSpec {
            name: "department",
            kind: ParamKind::Text,
            required: true,
            default: None,
            description: "Department name",
        }],
        columns: &[
            "employee_id",
            "full_name",
            "designation",
            "email",
            "manager_id",
            "date_of_joining",
            "status",
        ],
        sql: r#"
        SELECT employee_id, full_name, designation, email, manager_id, date_of_joining, status
        FROM employees
        WHERE LOWER(department) = LOWER($1)
        ORDER BY full_name
        "#,
    },
    ReportDef {
        name: "allocation_summary",
        title: "Allocation summary",
        description: "Active project count and total allocation per active employee",
        params: &[AS_OF],
        columns: &[
            "employee_id",
            "full_name",
            "department",
            "projects",
            "total_allocation",
        ],
        sql: r#"
        SELECT e.employee_id, e.full_name, e.department,
               COUNT(a.project_code) AS projects,
               COALESCE(SUM(a.allocation_percent), 0) AS total_allocation
        FROM employees e
        LEFT JOIN allocations a
          ON a.employee_id = e.employee_id
         AND a.start_date <= COALESCE($1::date, CURRENT_DATE)
         AND (a.end_date IS NULL OR a.end_date >= COALESCE($1::date, CURRENT_DATE))
        WHERE e.status = 'active'
        GROUP BY e.employee_id, e.full_name, e.department
        ORDER BY total_allocation DESC, e.employee_id
        "#,
    },
    ReportDef {
        name: "over_allocated",
        title: "Over-allocated employees",
        description: "Employees whose active allocations exceed a threshold percentage",
        params: &[
            AS_OF,
            ParamSpec {
                name: "threshold",
                kind: ParamKind::Number,
                required: false,
                default: Some("100"),
                description: "Allocation percentage to exceed",
            },
        ],
        columns: &["employee_id", "full_name", "total_allocation", "projects"],
        sql: r#"
        SELECT a.employee_id, e.full_name,
               SUM(a.allocation_percent) AS total_allocation,
               STRING_AGG(a.project_code, ', ' ORDER BY a.project_code) AS projects
        FROM allocations a
        LEFT JOIN employees e ON e.employee_id = a.employee_id
        WHERE a.start_date <= COALESCE($1::date, CURRENT_DATE)
          AND (a.end_date IS NULL OR a.end_date >= COALESCE($1::date, CURRENT_DATE))
        GROUP BY a.employee_id, e.full_name
        HAVING SUM(a.allocation_percent) > $2
        ORDER BY total_allocation DESC, a.employee_id
        "#,
    },
    ReportDef {
        name: "bench",
        title: "Bench",
        description: "Active employees without any active allocation",
        params: &[AS_OF],
        columns: &["employee_id", "full_name", "department", "designation"],
        sql: r#"
        SELECT e.employee_id, e.full_name, e.department, e.designation
        FROM employees e
        WHERE e.status = 'active'
          AND NOT EXISTS (
              SELECT 1 FROM allocations a
              WHERE a.employee_id = e.employee_id
                AND a.start_date <= COALESCE($1::date, CURRENT_DATE)
                AND (a.end_date IS NULL OR a.end_date >= COALESCE($1::date, CURRENT_DATE))
          )
        ORDER BY e.department, e.full_name
        "#,
    },
    ReportDef {
        name: "timesheet_hours",
        title: "Timesheet hours",
        description: "Hours logged per employee and project within a date range",
        params: &[FROM, TO],
        columns: &["employee_id", "full_name", "project_code", "hours", "days"],
        sql: r#"
        SELECT t.employee_id, e.full_name,
               COALESCE(t.project_code, '(none)') AS project_code,
               SUM(t.hours) AS hours,
               COUNT(DISTINCT t.work_date) AS days
        FROM timesheets t
        LEFT JOIN employees e ON e.employee_id = t.employee_id
        WHERE t.work_date BETWEEN $1::date AND COALESCE($2::date, CURRENT_DATE)
        GROUP BY t.employee_id, e.full_name, COALESCE(t.project_code, '(none)')
        ORDER BY t.employee_id, project_code
        "#,
    },
    ReportDef {
        name: "activity_summary",
        title: "Activity summary",
        description: "Dashboard actions and outcomes over the last N days",
        params: &[ParamSpec {
            name: "days",
            kind: ParamKind::Integer,
            required: false,
            default: Some("30"),
            description: "Look-back window in days",
        }],
        columns: &["action", "outcome", "events", "last_seen"],
        sql: r#"
        SELECT action, outcome, COUNT(*) AS events, MAX(occurred_at) AS last_seen
        FROM activity_logs
        WHERE occurred_at >= now() - make_interval(days => $1::int)
        GROUP BY action, outcome
        ORDER BY events DESC, action
        "#,
    },
];

pub fn catalogue() -> &'static [ReportDef] {
    REPORTS
}

pub fn find(name: &str) -> Result<&'static ReportDef> {
    REPORTS
        .iter()
        .find(|r| r.name == name)
        .ok_or_else(|| HrError::UnknownReport {
            name: name.to_string(),
        })
}

/// Check `given` against the report's parameter list and convert each value.
///
/// Returned values are in declaration order, ready for positional binding.
pub fn resolve_params(
    report: &ReportDef,
    given: &BTreeMap<String, String>,
) -> Result<Vec<ParamValue>> {
    if let Some(unknown) = given
        .keys()
        .find(|key| !report.params.iter().any(|p| p.name == key.as_str()))
    {
        return Err(HrError::invalid_parameter(
            unknown,
            format!("not accepted by report '{}'", report.name),
        ));
    }

    let mut values = Vec::with_capacity(report.params.len());
    for spec in report.params {
        let raw = given
            .get(spec.name)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
            .or(spec.default);

        if raw.is_none() && spec.required {
            return Err(HrError::invalid_parameter(spec.name, "is required"));
        }
        values.push(parse_param(spec, raw)?);
    }

    check_period(report, &values)?;
    Ok(values)
}

fn parse_param(spec: &ParamSpec, raw: Option<&str>) -> Result<ParamValue> {
    let invalid = |reason: &str| HrError::invalid_parameter(spec.name, reason);

    let value = match spec.kind {
        ParamKind::Date => ParamValue::Date(
            raw.map(|s| {
                NaiveDate::parse_from_str(s, "%Y-%m-%d")
                    .map_err(|_| invalid(&format!("'{}' is not a date (expected YYYY-MM-DD)", s)))
            })
            .transpose()?,
        ),
        ParamKind::Text => ParamValue::Text(raw.map(str::to_owned)),
        ParamKind::Integer => ParamValue::Integer(
            raw.map(|s| match s.parse::<i64>() {
                Ok(v) if v >= 0 => Ok(v),
                Ok(_) => Err(invalid("must not be negative")),
                Err(_) => Err(invalid(&format!("'{}' is not a whole number", s))),
            })
            .transpose()?,
        ),
        ParamKind::Number => ParamValue::Number(
            raw.map(|s| match s.parse::<f64>() {
                Ok(v) if v.is_finite() && v >= 0.0 => Ok(v),
                Ok(_) => Err(invalid("must be a finite, non-negative number")),
                Err(_) => Err(invalid(&format!("'{}' is not a number", s))),
            })
            .transpose()?,
        ),
    };
    Ok(value)
}

/// `from` must not be after `to` when both are given
fn check_period(report: &ReportDef, values: &[ParamValue]) -> Result<()> {
    let date_of = |name: &str| {
        report
            .params
            .iter()
            .position(|p| p.name == name)
            .and_then(|i| match values.get(i) {
                Some(ParamValue::Date(d)) => *d,
                _ => None,
            })
    };
    if let (Some(from), Some(to)) = (date_of("from"), date_of("to")) {
        if from > to {
            return Err(HrError::invalid_parameter(
                "to",
                format!("{} is before 'from' ({})", to, from),
            ));
        }
    }
    Ok(())
}

/// Validate `name` and `params`, then run the report.
///
/// Nothing touches the database until validation has passed. SQL errors
/// (a table that does not exist yet, for instance) come back as
/// [`HrError::QueryFailed`].
pub async fn run_report(
    pool: &DbPool,
    name: &str,
    params: &BTreeMap<String, String>,
) -> Result<Table> {
    let report = find(name)?;
    let values = resolve_params(report, params)?;
    debug!(report = report.name, params = ?values, "running report");

    let mut query = sqlx::query(report.sql);
    for value in values {
        query = match value {
            ParamValue::Date(v) => query.bind(v),
            ParamValue::Text(v) => query.bind(v),
            ParamValue::Integer(v) => query.bind(v),
            ParamValue::Number(v) => query.bind(v),
        };
    }

    let rows = query
        .fetch_all(pool.inner())
        .await
        .map_err(HrError::from_query)?;
    let table = rows_to_table(&rows, report.columns)?;

    info!(report = report.name, rows = table.len(), "report finished");
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn params(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn date(s: &str) -> Option<NaiveDate> {
        Some(NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap())
    }

    #[test]
    fn catalogue_names_are_unique() {
        let names: HashSet<&str> = catalogue().iter().map(|r| r.name).collect();
        assert_eq!(names.len(), catalogue().len());
    }

    #[test]
    fn placeholders_match_declared_params() {
        for report in catalogue() {
            let highest = (1..=9)
                .filter(|n| report.sql.contains(&format!("${}", n)))
                .max()
                .unwrap_or(0);
            assert_eq!(highest, report.params.len(), "report {}", report.name);
        }
    }

    #[test]
    fn unknown_report_is_rejected() {
        assert!(matches!(
            find("payroll_export"),
            Err(HrError::UnknownReport { name }) if name == "payroll_export"
        ));
    }

    #[test]
    fn missing_required_param() {
        let report = find("new_joiners").unwrap();
        let err = resolve_params(report, &params(&[])).unwrap_err();
        assert!(matches!(err, HrError::InvalidParameter { name, .. } if name == "from"));
    }

    #[test]
    fn optional_params_bind_null_or_default() {
        let report = find("new_joiners").unwrap();
        let values = resolve_params(report, &params(&[("from", "2024-01-01")])).unwrap();
        assert_eq!(
            values,
            vec![ParamValue::Date(date("2024-01-01")), ParamValue::Date(None)]
        );

        let report = find("over_allocated").unwrap();
        let values = resolve_params(report, &params(&[])).unwrap();
        assert_eq!(values, vec![ParamValue::Date(None), ParamValue::Number(Some(100.0))]);
    }

    #[test]
    fn blank_values_count_as_missing() {
        let report = find("activity_summary").unwrap();
        let values = resolve_params(report, &params(&[("days", "  ")])).unwrap();
        assert_eq!(values, vec![ParamValue::Integer(Some(30))]);
    }

    #[test]
    fn malformed_values_are_rejected() {
        let report = find("new_joiners").unwrap();
        let err = resolve_params(report, &params(&[("from", "01/02/2024")])).unwrap_err();
        assert!(err.to_string().contains("YYYY-MM-DD"), "{err}");

        let report = find("activity_summary").unwrap();
        assert!(resolve_params(report, &params(&[("days", "ten")])).is_err());
        assert!(resolve_params(report, &params(&[("days", "-3")])).is_err());

        let report = find("over_allocated").unwrap();
        assert!(resolve_params(report, &params(&[("threshold", "NaN")])).is_err());
    }

    #[test]
    fn unknown_param_is_rejected() {
        let report = find("headcount_by_department").unwrap();
        let err = resolve_params(report, &params(&[("dept", "Sales")])).unwrap_err();
        assert!(matches!(err, HrError::InvalidParameter { name, .. } if name == "dept"));
    }

    #[test]
    fn reversed_period_is_rejected() {
        let report = find("timesheet_hours").unwrap();
        let err = resolve_params(report, &params(&[("from", "2024-03-31"), ("to", "2024-03-01")]))
            .unwrap_err();
        assert!(matches!(err, HrError::InvalidParameter { name, .. } if name == "to"));
    }

    #[tokio::test]
    async fn validation_happens_before_database_access() {
        let mut config = crate::config::DatabaseConfig::default();
        config.port = 1;
        config.min_connections = 0;
        let pool = DbPool::connect_lazy(&config);

        let err = run_report(&pool, "no_such_report", &params(&[])).await.unwrap_err();
        assert!(matches!(err, HrError::UnknownReport { .. }));

        let err = run_report(&pool, "department_roster", &params(&[]))
            .await
            .unwrap_err();
        assert!(matches!(err, HrError::InvalidParameter { .. }));
    }
}
