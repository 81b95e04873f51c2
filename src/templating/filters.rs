//! Filter and test overrides for the exploratory render pass.
//!
//! The engine's built-in `int`, `float` and `default` filters and the `defined` /
//! `undefined` tests only know the engine's own undefined value. In the lenient pass an
//! unresolved name is a [`LenientValue`] object instead, so these are replaced with
//! versions that treat placeholders as undefined:
//!
//! - `{{ build_number|int }}` → `0`
//! - `{{ data.version|float }}` → `0.0`
//! - `{{ data.version|default('0.0.0') }}` → `0.0.0`
//! - `{% if data is defined %}` → false
//!
//! The string filters most recipes apply to versions and names (`lower`, `upper`,
//! `replace`, `trim`) pass placeholders through unchanged so a chain such as
//! `{{ data.version|replace('-', '_')|lower }}` keeps rendering as the empty string.
//!
//! The strict pass uses the engine's built-ins unchanged.

use minijinja::value::Value;
use minijinja::{Environment, Error, ErrorKind};

use super::lenient::LenientValue;

/// Install the lenient overrides into `env`.
pub fn register_lenient(env: &mut Environment<'_>) {
    env.add_filter("int", int);
    env.add_filter("float", float);
    env.add_filter("default", default);
    env.add_filter("d", default);
    env.add_filter("lower", lower);
    env.add_filter("upper", upper);
    env.add_filter("replace", replace);
    env.add_filter("trim", trim);
    env.add_test("defined", is_defined);
    env.add_test("undefined", is_undefined);
}

fn is_unresolved(value: &Value) -> bool {
    value.is_undefined() || LenientValue::is_placeholder(value)
}

fn conversion_error(value: &Value, target: &str) -> Error {
    Error::new(
        ErrorKind::InvalidOperation,
        format!("cannot convert {} to {target}", value.kind()),
    )
}

fn int(value: Value) -> Result<Value, Error> {
    if is_unresolved(&value) || value.is_none() {
        return Ok(Value::from(0));
    }
    if let Some(s) = value.as_str() {
        let s = s.trim();
        return s
            .parse::<i64>()
            .map(Value::from)
            .or_else(|_| s.parse::<f64>().map(|f| Value::from(f.trunc() as i64)))
            .map_err(|_| conversion_error(&value, "integer"));
    }
    if let Ok(i) = i64::try_from(value.clone()) {
        return Ok(Value::from(i));
    }
    f64::try_from(value.clone())
        .map(|f| Value::from(f.trunc() as i64))
        .map_err(|_| conversion_error(&value, "integer"))
}

fn float(value: Value) -> Result<Value, Error> {
    if is_unresolved(&value) || value.is_none() {
        return Ok(Value::from(0.0));
    }
    if let Some(s) = value.as_str() {
        return s
            .trim()
            .parse::<f64>()
            .map(Value::from)
            .map_err(|_| conversion_error(&value, "float"));
    }
    f64::try_from(value.clone())
        .map(Value::from)
        .map_err(|_| conversion_error(&value, "float"))
}

fn default(value: Value, other: Option<Value>, lax: Option<bool>) -> Value {
    let fallback = || other.clone().unwrap_or_else(|| Value::from(""));
    if is_unresolved(&value) || (lax.unwrap_or(false) && !value.is_true()) {
        fallback()
    } else {
        value
    }
}

fn map_str(value: Value, f: impl FnOnce(&str) -> String) -> Value {
    if is_unresolved(&value) {
        return value;
    }
    match value.as_str() {
        Some(s) => Value::from(f(s)),
        None => Value::from(f(&value.to_string())),
    }
}

fn lower(value: Value) -> Value {
    map_str(value, str::to_lowercase)
}

fn upper(value: Value) -> Value {
    map_str(value, str::to_uppercase)
}

fn replace(value: Value, from: String, to: String, count: Option<usize>) -> Value {
    map_str(value, |s| match count {
        Some(n) => s.replacen(&from, &to, n),
        None => s.replace(&from, &to),
    })
}

fn trim(value: Value, chars: Option<String>) -> Value {
    map_str(value, |s| match chars {
        Some(chars) => s.trim_matches(|c| chars.contains(c)).to_string(),
        None => s.trim().to_string(),
    })
}

fn is_defined(value: Value) -> bool {
    !is_unresolved(&value)
}

fn is_undefined(value: Value) -> bool {
    is_unresolved(&value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::templating::lenient::UnresolvedNameLog;

    fn lenient_env() -> Environment<'static> {
        let mut env = Environment::new();
        register_lenient(&mut env);
        env
    }

    fn render(template: &str) -> String {
        let ctx = minijinja::context! {
            data => LenientValue::new("data", UnresolvedNameLog::new()).into_value(),
            number => "42",
            name => "Foo-Bar",
        };
        lenient_env().render_str(template, ctx).unwrap()
    }

    #[test]
    fn test_numeric_filters_on_placeholders() {
        assert_eq!(render("{{ data|int }}"), "0");
        assert_eq!(render("{{ data.build|int + 1 }}"), "1");
        assert_eq!(render("{{ data|float }}"), "0.0");
    }

    #[test]
    fn test_numeric_filters_on_real_values() {
        assert_eq!(render("{{ number|int }}"), "42");
        assert_eq!(render("{{ '3.9'|int }}"), "3");
        assert_eq!(render("{{ number|float }}"), "42.0");
    }

    #[test]
    fn test_default_treats_placeholder_as_undefined() {
        assert_eq!(render("{{ data.version|default('1.0') }}"), "1.0");
        assert_eq!(render("{{ name|d('x') }}"), "Foo-Bar");
        assert_eq!(render("{{ ''|default('x', true) }}"), "x");
    }

    #[test]
    fn test_defined_tests() {
        assert_eq!(render("{% if data is defined %}y{% else %}n{% endif %}"), "n");
        assert_eq!(render("{% if data.x is undefined %}y{% else %}n{% endif %}"), "y");
        assert_eq!(render("{% if name is defined %}y{% else %}n{% endif %}"), "y");
    }

    #[test]
    fn test_string_filters_pass_placeholders_through() {
        assert_eq!(render("[{{ data.version|replace('-', '_')|lower|trim }}]"), "[]");
        assert_eq!(render("{{ name|replace('-', '_')|lower }}"), "foo_bar");
        assert_eq!(render("{{ name|upper }}"), "FOO-BAR");
    }
}
