//! Minimal server-rendered pages. Every interpolated value is escaped.

use crate::auth::session::{Flash, FlashKind};
use crate::types::{Account, DepartmentView, Principal, Role, StudentProfile};
use axum::response::Html;

pub fn escape(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#x27;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

fn layout(title: &str, flash: Option<Flash>, body: &str) -> Html<String> {
    let flash = flash
        .map(|flash| {
            let class = match flash.kind {
                FlashKind::Success => "flash success",
                FlashKind::Error => "flash error",
            };
            format!(r#"<p class="{}">{}</p>"#, class, escape(&flash.message))
        })
        .unwrap_or_default();

    Html(format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head><meta charset="utf-8"><title>{title} | Registrar</title></head>
<body>
<h1>{title}</h1>
{flash}
{body}
</body>
</html>"#,
        title = escape(title),
        flash = flash,
        body = body
    ))
}

fn nav(principal: &Principal) -> String {
    format!(
        r#"<nav>Signed in as {} ({}) | <a href="/logout">Log out</a></nav>"#,
        escape(&principal.full_name),
        principal.role
    )
}

fn role_options(selected: Role) -> String {
    Role::ALL
        .iter()
        .map(|role| {
            let marker = if *role == selected { " selected" } else { "" };
            format!(r#"<option value="{0}"{1}>{0}</option>"#, role, marker)
        })
        .collect()
}

fn department_options(departments: &[DepartmentView], selected: Option<i64>) -> String {
    let mut options = String::from(r#"<option value="">(none)</option>"#);
    for department in departments {
        let marker = if Some(department.department_id) == selected {
            " selected"
        } else {
            ""
        };
        options.push_str(&format!(
            r#"<option value="{}"{}>{}</option>"#,
            department.department_id,
            marker,
            escape(&department.department_code)
        ));
    }
    options
}

pub fn login(flash: Option<Flash>) -> Html<String> {
    layout(
        "Sign in",
        flash,
        r#"<form method="post" action="/login">
<label>Email <input type="email" name="email" required></label>
<label>Password <input type="password" name="password" required></label>
<button type="submit">Sign in</button>
</form>"#,
    )
}

pub struct AdminCounts {
    pub students: i64,
    pub faculty: i64,
    pub departments: i64,
}

pub fn admin_dashboard(principal: &Principal, counts: &AdminCounts, flash: Option<Flash>) -> Html<String> {
    let body = format!(
        r#"{nav}
<ul>
<li>Students: {students}</li>
<li>Faculty: {faculty}</li>
<li>Departments: {departments}</li>
</ul>
<p><a href="/admin/users">Manage users</a></p>"#,
        nav = nav(principal),
        students = counts.students,
        faculty = counts.faculty,
        departments = counts.departments
    );
    layout("Administration", flash, &body)
}

pub fn admin_users(
    principal: &Principal,
    accounts: &[Account],
    departments: &[DepartmentView],
    flash: Option<Flash>,
) -> Html<String> {
    let rows: String = accounts
        .iter()
        .map(|account| {
            let status = if account.is_active { "active" } else { "inactive" };
            format!(
                r#"<tr>
<td>{id}</td>
<td><form method="post" action="/admin/users/{id}">
<input name="full_name" value="{name}">
<input type="email" name="email" value="{email}">
<select name="user_type">{roles}</select>
<select name="department_id">{departments}</select>
<input type="password" name="password" placeholder="unchanged">
<button type="submit">Save</button>
</form></td>
<td>{status}</td>
<td><form method="post" action="/admin/users/{id}/toggle"><button type="submit">Toggle</button></form></td>
</tr>"#,
                id = account.user_id,
                name = escape(&account.full_name),
                email = escape(&account.email),
                roles = role_options(account.role),
                departments = department_options(departments, account.department_id),
                status = status
            )
        })
        .collect();

    let body = format!(
        r#"{nav}
<h2>Add user</h2>
<form method="post" action="/admin/users">
<input name="full_name" placeholder="Full name" required>
<input type="email" name="email" placeholder="Email" required>
<input type="password" name="password" placeholder="Password" required>
<select name="user_type">{roles}</select>
<select name="department_id">{departments}</select>
<button type="submit">Add</button>
</form>
<h2>Accounts</h2>
<table>
<tr><th>ID</th><th>Account</th><th>Status</th><th></th></tr>
{rows}
</table>"#,
        nav = nav(principal),
        roles = role_options(Role::Student),
        departments = department_options(departments, None),
        rows = rows
    );
    layout("Users", flash, &body)
}

pub fn dashboard(principal: &Principal, flash: Option<Flash>) -> Html<String> {
    let profile_link = if principal.role == Role::Student {
        "\n<p><a href=\"/profile\">My profile</a></p>"
    } else {
        ""
    };
    let body = format!(
        "{}\n<p>Welcome, {}. You are signed in as {}.</p>{}",
        nav(principal),
        escape(&principal.full_name),
        principal.role,
        profile_link
    );
    layout("Dashboard", flash, &body)
}

pub fn student_profile(
    principal: &Principal,
    profile: &StudentProfile,
    flash: Option<Flash>,
) -> Html<String> {
    let value = |field: &Option<String>| escape(field.as_deref().unwrap_or_default());
    let body = format!(
        r#"{nav}
<p>Roll number: {roll}</p>
<form method="post" action="/profile">
<label>Email <input type="email" name="email" value="{email}" required></label>
<label>New password <input type="password" name="password" placeholder="unchanged"></label>
<label>Date of birth <input type="date" name="date_of_birth" value="{dob}"></label>
<label>Phone <input name="phone_number_self" value="{phone}"></label>
<label>Guardian phone <input name="phone_number_guardian" value="{guardian}"></label>
<label>Current address <textarea name="current_address">{current}</textarea></label>
<label>Permanent address <textarea name="permanent_address">{permanent}</textarea></label>
<button type="submit">Save</button>
</form>"#,
        nav = nav(principal),
        roll = value(&profile.roll_number),
        email = escape(&principal.email),
        dob = value(&profile.date_of_birth),
        phone = value(&profile.phone_number_self),
        guardian = value(&profile.phone_number_guardian),
        current = value(&profile.current_address),
        permanent = value(&profile.permanent_address)
    );
    layout("My profile", flash, &body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape() {
        assert_eq!(
            escape(r#"<script>alert("x&y")</script>"#),
            "&lt;script&gt;alert(&quot;x&amp;y&quot;)&lt;/script&gt;"
        );
    }

    #[test]
    fn test_login_page_shows_flash() {
        let Html(page) = login(Some(Flash::error("Invalid <credentials>")));
        assert!(page.contains("Invalid &lt;credentials&gt;"));
        assert!(page.contains(r#"action="/login""#));
    }
}
