//! Built-in report schemas
//!
//! The report types the upload front-end knows by tag. Each one is plain
//! data; TOML schema files may add types or ship newer versions.

use crate::ingest::types::{
    CaseFold, Coercion, FooterRule, HeaderSource, LabelStyle, ReportSchema, Whitespace, WriteMode,
};

/// All built-in schemas
pub fn builtin_schemas() -> Vec<ReportSchema> {
    vec![
        labor(),
        diverse_daily(),
        employee_total(),
        horizon(),
        employee_weekly(),
        diverse_weekly(),
        hire_dynamics_weekly(),
        freight_breakers_weekly(),
    ]
}

fn exact_case() -> LabelStyle {
    LabelStyle::new(CaseFold::Preserve, Whitespace::Collapse)
}

fn squeezed_lower() -> LabelStyle {
    LabelStyle::new(CaseFold::Lower, Whitespace::Remove)
}

/// Daily labor hours per employee
pub fn labor() -> ReportSchema {
    ReportSchema::builder("labor", "daily_reports")
        .text("employee", "Employee")
        .text("shift_g4", "Shift (G4)")
        .text("department_g3", "Department (G3)")
        .column("date", "Date", Coercion::DateFlexible)
        .number("reg_hrs", "Reg. Hrs")
        .number("reg_pay", "Reg. Pay")
        .number("reg_rate", "Reg Rate")
        .number("ot", "OT")
        .number("ot_1_pay", "OT1 Pay")
        .number("total_hrs", "Total Hrs")
        .number("total_pay", "Total Pay")
        .exact_headers()
        .label_style(exact_case())
        .single_period("uploaded_date")
        .uploader_column("uploaded_by")
        .identifying(&["uploaded_date", "employee"])
        .mutable_all()
        .footer(FooterRule {
            marker: "TOTAL".to_string(),
            stop_on_empty: false,
        })
        .build()
}

/// Daily staffing-agency export with metadata rows above a positional header
pub fn diverse_daily() -> ReportSchema {
    ReportSchema::builder("diversedaily", "diverse_daily_reports")
        .text("employee_payroll_id", "EMPLOYEE PAYROLL ID")
        .text("employee_name", "EMPLOYEE NAME")
        .text("first_name", "FIRST NAME")
        .text("last_name", "LAST NAME")
        .number("pay_rate", "PAY RATE")
        .number("bill_rate", "BILL RATE")
        .text("department_name", "DEPARTMENT NAME")
        .number("reg", "REG")
        .number("ot1", "OT1")
        .number("ot2", "OT2")
        .number("vac", "VAC")
        .number("hol", "HOL")
        .number("sic", "SIC")
        .number("oth", "OTH")
        .number("total", "TOTAL")
        .column("date", "DATE", Coercion::DateFlexible)
        .number("usd_cost", "USD COST")
        .expected_headers(&["EMPLOYEE NAME", "EMPLOYEE PAYROLL ID", "LAST NAME"])
        .header_source(HeaderSource::Values)
        .single_period("uploaded_date")
        .uploader_column("uploaded_by")
        .identifying(&["uploaded_date", "employee_payroll_id"])
        .mutable_all()
        .footer(FooterRule::default())
        .build()
}

/// Per-department payroll totals; each upload replaces its report date
pub fn employee_total() -> ReportSchema {
    ReportSchema::builder("employeeTotal", "employee_reports")
        .text("business_unit_description", "Business Unit Description")
        .text("business_unit_code", "Business Unit Code")
        .text("home_department_code", "Home Department Code")
        .text("worked_department", "Worked Department")
        .text("pay_code_timecard", "Pay Code [Timecard]")
        .number("dollars", "Dollars")
        .number("hours", "Hours")
        .text("shift", "Shift")
        .label_style(exact_case())
        .single_period("uploaded_date")
        .uploader_column("uploaded_by")
        .identifying(&["uploaded_date"])
        .mutable_all()
        .write_mode(WriteMode::ReplacePeriod)
        .build()
}

/// Daily warehouse operations summary per shift
pub fn horizon() -> ReportSchema {
    ReportSchema::builder("horizon", "horizon_reports")
        .text("shift", "Shift")
        .column("report_day", "Date", Coercion::DateSpreadsheetSerial)
        .number("total_scheduled_lumpers", "Total Scheduled Lumpers")
        .number("total_present_lumpers", "Total Present Lumpers")
        .number("late", "Late")
        .number("no_work", "No Work")
        .number("no_call_no_show", "No Call/ No Show")
        .number("called_out", "Called Out")
        .number("early_dismissal", "Early Dismissal")
        .number("new_starters_today", "New Starters Today")
        .number("terminations", "Terminations")
        .number("resignations", "Resignations")
        .number("inbound_scheduled", "Inbound Scheduled")
        .number("inbound_completed", "Inbound Completed")
        .number("total_cases_unloaded", "Total Cases Unloaded")
        .number("total_cases_closed_for_the_day", "Total Cases Closed For The Day")
        .number(
            "total_containers_carried_over_to_the_next_day",
            "Total Containers Carried Over To The Next Day",
        )
        .number("total_hours_for_the_day", "Total Hours For The Day")
        .number("cpm_for_the_day", "CPM For The Day")
        .number("number_of_skus", "Number Of SKUs")
        .number("near_misses", "Near Misses")
        .number("incidents", "Incidents")
        .number("accidents", "Accidents")
        .single_period("uploaded_date")
        .period_override("report_day")
        .uploader_column("uploaded_by")
        .identifying(&["uploaded_date", "shift"])
        .mutable_all()
        .reject_if_empty()
        .build()
}

/// Weekly payroll by pay code; each upload replaces its week
pub fn employee_weekly() -> ReportSchema {
    ReportSchema::builder("employee_weekly", "employee_weekly")
        .text("business_unit_description", "BUSINESS UNIT DESCRIPTION")
        .text("business_unit_code", "BUSINESS UNIT CODE")
        .text("home_department_code", "HOME DEPARTMENT CODE")
        .text("pay_code", "PAY CODE")
        .number("dollars", "DOLLARS")
        .number("hours", "HOURS")
        .text("shift", "SHIFT")
        .label_style(LabelStyle::default().with_annotations_stripped())
        .header_row_is_data(false)
        .range_period("start_date", "end_date")
        .uploader_column("uploaded_by")
        .identifying(&["start_date", "end_date"])
        .mutable_all()
        .write_mode(WriteMode::ReplacePeriod)
        .build()
}

/// Weekly staffing-agency hours per payroll id
pub fn diverse_weekly() -> ReportSchema {
    ReportSchema::builder("diverse_weekly", "diverse_weekly_reports")
        .text("employee_name", "EMPLOYEE NAME")
        .text("employee_payroll_id", "EMPLOYEE PAYROLL ID")
        .text("first_name", "FIRST NAME")
        .text("last_name", "LAST NAME")
        .text("department_name", "DEPARTMENT NAME")
        .number("reg", "REG")
        .number("ot1", "OT1")
        .number("total", "TOTAL")
        .number("bill_rate", "BILL RATE")
        .exact_headers()
        .ordered_headers()
        .range_period("start_date", "end_date")
        .uploader_column("uploaded_by")
        .identifying(&["employee_payroll_id", "start_date", "end_date"])
        .mutable_all()
        .build()
}

/// Weekly punch-level timecards
pub fn hire_dynamics_weekly() -> ReportSchema {
    ReportSchema::builder("hire_dynamics_weekly", "hire_dynamics_weekly")
        .text("employee_id", "Employee")
        .text("department_g3", "Department  (G3)")
        .column("work_date", "Work Date", Coercion::DateFlexible)
        .text("approval_status", "Approval Status")
        .text("time_dcomp", "TIME.DCOMP")
        .column("date", "Date", Coercion::DateFlexible)
        .text("paycode", "Paycode")
        .text("in_time", "IN")
        .text("in_ex", "In Ex")
        .text("out_time", "OUT")
        .text("out_ex", "Out Ex")
        .text("reason", "Reason")
        .text("department", "Department")
        .text("shift_pay_ex", "Sh/Pay Ex")
        .number("reg_hrs", "Reg Hrs")
        .number("ot", "OT")
        .number("dt", "DT")
        .number("daily_total", "Daily Total")
        .number("count", "COUNT")
        .label_style(squeezed_lower())
        .range_period("start_date", "end_date")
        .identifying(&["employee_id", "start_date", "end_date", "work_date"])
        .mutable_all()
        .build()
}

/// Weekly container unloading piece-rate report
pub fn freight_breakers_weekly() -> ReportSchema {
    ReportSchema::builder("freight_breakers_weekly", "freight_breakers_weekly")
        .column("date", "Date", Coercion::DateFlexible)
        .text("employee", "Employee")
        .text("job", "Job")
        .text("container", "Container")
        .number("qty", "QTY")
        .number("sku_count", "SKUCount")
        .text("door", "Door")
        .text("type", "Type")
        .number("units", "Units")
        .number("rate", "Rate")
        .number("amount", "Amount")
        .label_style(squeezed_lower())
        .range_period("start_date", "end_date")
        .identifying(&["start_date", "end_date", "date"])
        .mutable_all()
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_schemas_are_valid() {
        for schema in builtin_schemas() {
            assert!(
                schema.validate().is_ok(),
                "{}: {:?}",
                schema.report_type,
                schema.validate()
            );
        }
    }

    #[test]
    fn test_builtin_tags_are_unique() {
        let schemas = builtin_schemas();
        let mut tags: Vec<_> = schemas.iter().map(|s| s.report_type.as_str()).collect();
        tags.sort();
        tags.dedup();
        assert_eq!(tags.len(), 8);
    }

    #[test]
    fn test_horizon_mutable_excludes_key() {
        let schema = horizon();
        assert!(!schema.mutable.contains(&"shift".to_string()));
        assert!(schema.mutable.contains(&"uploaded_by".to_string()));
        assert!(schema.reject_if_empty);
        assert_eq!(schema.period_override.as_deref(), Some("report_day"));
    }

    #[test]
    fn test_replace_period_schemas_key_on_period_only() {
        assert_eq!(employee_total().identifying, vec!["uploaded_date"]);
        assert_eq!(employee_weekly().identifying, vec!["start_date", "end_date"]);
        assert!(employee_total().mutable.contains(&"shift".to_string()));
    }
}
