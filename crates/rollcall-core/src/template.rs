//! Message templates — named content with `{{variable}}` placeholders.
//!
//! Resolution order is owner-specific row, then global row, then the
//! built-in default baked into this module. Rendering never fails: unknown
//! placeholders collapse to the empty string.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::types::{ChannelKind, TriggerKind};

/// Template slot, keyed by (trigger kind, channel).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateKind {
    AbsenceEmail,
    AbsenceSms,
    LowAttendanceEmail,
    LowAttendanceSms,
    WeeklyReportEmail,
    WeeklyReportSms,
    MonthlyReportEmail,
    MonthlyReportSms,
    Custom,
}

impl TemplateKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AbsenceEmail => "absence_email",
            Self::AbsenceSms => "absence_sms",
            Self::LowAttendanceEmail => "low_attendance_email",
            Self::LowAttendanceSms => "low_attendance_sms",
            Self::WeeklyReportEmail => "weekly_report_email",
            Self::WeeklyReportSms => "weekly_report_sms",
            Self::MonthlyReportEmail => "monthly_report_email",
            Self::MonthlyReportSms => "monthly_report_sms",
            Self::Custom => "custom",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "absence_email" => Some(Self::AbsenceEmail),
            "absence_sms" => Some(Self::AbsenceSms),
            "low_attendance_email" => Some(Self::LowAttendanceEmail),
            "low_attendance_sms" => Some(Self::LowAttendanceSms),
            "weekly_report_email" => Some(Self::WeeklyReportEmail),
            "weekly_report_sms" => Some(Self::WeeklyReportSms),
            "monthly_report_email" => Some(Self::MonthlyReportEmail),
            "monthly_report_sms" => Some(Self::MonthlyReportSms),
            "custom" => Some(Self::Custom),
            _ => None,
        }
    }

    /// The template slot used when `kind` fires on `channel`.
    pub fn for_trigger(kind: TriggerKind, channel: ChannelKind) -> Self {
        match (kind, channel) {
            (TriggerKind::Absence, ChannelKind::Email) => Self::AbsenceEmail,
            (TriggerKind::Absence, ChannelKind::Sms) => Self::AbsenceSms,
            (TriggerKind::LowAttendance, ChannelKind::Email) => Self::LowAttendanceEmail,
            (TriggerKind::LowAttendance, ChannelKind::Sms) => Self::LowAttendanceSms,
            (TriggerKind::WeeklyReport, ChannelKind::Email) => Self::WeeklyReportEmail,
            (TriggerKind::WeeklyReport, ChannelKind::Sms) => Self::WeeklyReportSms,
            (TriggerKind::MonthlyReport, ChannelKind::Email) => Self::MonthlyReportEmail,
            (TriggerKind::MonthlyReport, ChannelKind::Sms) => Self::MonthlyReportSms,
        }
    }

    /// Built-in default content, the terminal fallback when neither an
    /// owner-specific nor a global template row exists.
    pub fn builtin(&self) -> &'static str {
        match self {
            Self::AbsenceEmail => BUILTIN_ABSENCE_EMAIL,
            Self::AbsenceSms => BUILTIN_ABSENCE_SMS,
            Self::LowAttendanceEmail => BUILTIN_LOW_ATTENDANCE_EMAIL,
            Self::LowAttendanceSms => BUILTIN_LOW_ATTENDANCE_SMS,
            Self::WeeklyReportEmail => BUILTIN_WEEKLY_REPORT_EMAIL,
            Self::WeeklyReportSms => BUILTIN_WEEKLY_REPORT_SMS,
            Self::MonthlyReportEmail => BUILTIN_MONTHLY_REPORT_EMAIL,
            Self::MonthlyReportSms => BUILTIN_MONTHLY_REPORT_SMS,
            Self::Custom => BUILTIN_CUSTOM,
        }
    }
}

impl std::fmt::Display for TemplateKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Replace every `{{key}}` with `variables[key]`. Unknown keys become the
/// empty string — never the literal placeholder, never an error. An
/// unterminated `{{` is copied through verbatim.
pub fn render(template: &str, variables: &HashMap<String, String>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find("}}") {
            Some(end) => {
                let key = after[..end].trim();
                if let Some(value) = variables.get(key) {
                    out.push_str(value);
                }
                rest = &after[end + 2..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

/// Email subject line for a trigger, built from the recipient's variables.
pub fn email_subject(kind: TriggerKind, variables: &HashMap<String, String>) -> String {
    let template = match kind {
        TriggerKind::Absence => "Absence Alert: {{student_name}} - {{date}}",
        TriggerKind::LowAttendance => {
            "Low Attendance Alert: {{student_name}} ({{attendance_rate}}%)"
        }
        TriggerKind::WeeklyReport => "Weekly Attendance Report: {{student_name}}",
        TriggerKind::MonthlyReport => "Monthly Attendance Report: {{student_name}}",
    };
    render(template, variables)
}

// Built-in defaults. Email bodies are simple markup; SMS bodies are plain
// text. The renderer does not care either way.

const BUILTIN_ABSENCE_EMAIL: &str = "\
<p>Dear <strong>{{guardian_name}}</strong>,</p>\n\
<p>This is to inform you that <strong>{{student_name}}</strong> \
(Roll No: {{roll_number}}) was marked <strong>absent</strong> in \
{{class_name}} {{section}} on <strong>{{date}}</strong>.</p>\n\
<p>If this is an error or the absence was planned, please contact the \
school office.</p>\n\
<p>{{school_name}}</p>";

const BUILTIN_ABSENCE_SMS: &str = "ABSENCE ALERT: {{student_name}} ({{roll_number}}) was absent \
from {{class_name}} on {{date}}. If this is an error, please contact the school. - {{school_name}}";

const BUILTIN_LOW_ATTENDANCE_EMAIL: &str = "\
<p>Dear <strong>{{guardian_name}}</strong>,</p>\n\
<p><strong>{{student_name}}</strong>'s attendance in {{class_name}} has \
fallen to <strong>{{attendance_rate}}%</strong> over the last 30 days \
({{present_days}} of {{total_days}} days), below the required minimum of \
{{threshold}}%.</p>\n\
<p>Please ensure regular attendance going forward, and contact us if \
anything is affecting it.</p>\n\
<p>{{school_name}}</p>";

const BUILTIN_LOW_ATTENDANCE_SMS: &str = "LOW ATTENDANCE: {{student_name}} is at \
{{attendance_rate}}% ({{present_days}}/{{total_days}} days). Minimum required: {{threshold}}%. \
- {{school_name}}";

const BUILTIN_WEEKLY_REPORT_EMAIL: &str = "\
<p>Dear <strong>{{guardian_name}}</strong>,</p>\n\
<p>Weekly attendance summary for <strong>{{student_name}}</strong> \
({{class_name}} {{section}}), {{start_date}} to {{end_date}}:</p>\n\
<ul>\n\
<li>Present: {{present_days}}</li>\n\
<li>Absent: {{absent_days}}</li>\n\
<li>Late: {{late_days}}</li>\n\
<li>Excused: {{excused_days}}</li>\n\
<li>Attendance rate: {{attendance_rate}}% of {{total_days}} days</li>\n\
</ul>\n\
<p>{{school_name}}</p>";

const BUILTIN_WEEKLY_REPORT_SMS: &str = "WEEKLY REPORT: {{student_name}} - \
{{attendance_rate}}% attendance this week ({{present_days}}/{{total_days}} days present). \
- {{school_name}}";

const BUILTIN_MONTHLY_REPORT_EMAIL: &str = "\
<p>Dear <strong>{{guardian_name}}</strong>,</p>\n\
<p>Monthly attendance summary for <strong>{{student_name}}</strong> \
({{class_name}} {{section}}), {{start_date}} to {{end_date}}:</p>\n\
<ul>\n\
<li>Present: {{present_days}}</li>\n\
<li>Absent: {{absent_days}}</li>\n\
<li>Late: {{late_days}}</li>\n\
<li>Excused: {{excused_days}}</li>\n\
<li>Attendance rate: {{attendance_rate}}% of {{total_days}} days</li>\n\
</ul>\n\
<p>Thank you for your continued support.</p>\n\
<p>{{school_name}}</p>";

const BUILTIN_MONTHLY_REPORT_SMS: &str = "MONTHLY REPORT: {{student_name}} achieved \
{{attendance_rate}}% attendance this month ({{present_days}}/{{total_days}} days). \
- {{school_name}}";

const BUILTIN_CUSTOM: &str =
    "Hello {{guardian_name}}, this is a notification about {{student_name}}.";

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn render_replaces_known_placeholders() {
        let out = render("Hi {{name}}, see {{name}}!", &vars(&[("name", "Ana")]));
        assert_eq!(out, "Hi Ana, see Ana!");
    }

    #[test]
    fn render_missing_variable_becomes_empty() {
        let out = render(
            "Hello {{name}}, rate {{rate}}%",
            &vars(&[("name", "Ana")]),
        );
        assert_eq!(out, "Hello Ana, rate %");
    }

    #[test]
    fn render_never_leaves_literal_placeholder() {
        let out = render("{{a}}{{b}}{{c}}", &vars(&[("b", "x")]));
        assert_eq!(out, "x");
    }

    #[test]
    fn render_unterminated_brace_copied_through() {
        let out = render("tail {{oops", &vars(&[]));
        assert_eq!(out, "tail {{oops");
    }

    #[test]
    fn render_whitespace_in_key_is_trimmed() {
        let out = render("{{ name }}", &vars(&[("name", "Ana")]));
        assert_eq!(out, "Ana");
    }

    #[test]
    fn template_kind_for_trigger_covers_both_channels() {
        assert_eq!(
            TemplateKind::for_trigger(TriggerKind::Absence, ChannelKind::Sms),
            TemplateKind::AbsenceSms
        );
        assert_eq!(
            TemplateKind::for_trigger(TriggerKind::MonthlyReport, ChannelKind::Email),
            TemplateKind::MonthlyReportEmail
        );
    }

    #[test]
    fn builtin_templates_render_clean() {
        let v = vars(&[
            ("guardian_name", "Mr. Reyes"),
            ("student_name", "Ana Reyes"),
            ("roll_number", "14"),
            ("class_name", "Grade 5"),
            ("date", "2026-03-02"),
            ("school_name", "Hillside"),
        ]);
        let out = render(TemplateKind::AbsenceSms.builtin(), &v);
        assert!(out.contains("Ana Reyes"));
        assert!(!out.contains("{{"));
    }

    #[test]
    fn subject_lines_per_kind() {
        let v = vars(&[("student_name", "Ana"), ("date", "2026-03-02"), ("attendance_rate", "62.5")]);
        assert_eq!(
            email_subject(TriggerKind::Absence, &v),
            "Absence Alert: Ana - 2026-03-02"
        );
        assert_eq!(
            email_subject(TriggerKind::LowAttendance, &v),
            "Low Attendance Alert: Ana (62.5%)"
        );
    }
}
