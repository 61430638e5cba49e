//! 설정 템플릿 렌더링
//!
//! `${NAME}` 형식의 플레이스홀더를 [`TemplateContext`] 값으로 치환합니다.
//! 누락된 변수는 조용히 빈 문자열로 바꾸지 않고, 한 번에 모아서 에러로 보고합니다.
//! `$$`는 리터럴 `$`로 출력됩니다.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::error::TemplateError;
use crate::secrets::EnvFile;

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\$|\$\{([A-Z0-9_]+)\}").expect("placeholder pattern is valid")
});

/// 템플릿 변수 집합
#[derive(Debug, Clone, Default)]
pub struct TemplateContext {
    vars: BTreeMap<String, String>,
}

impl TemplateContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.vars.insert(name.into(), value.into());
        self
    }

    /// `.env`의 모든 키를 변수로 추가합니다.
    pub fn extend_from_env(&mut self, env: &EnvFile) -> &mut Self {
        for (key, value) in env.iter() {
            self.vars.insert(key.to_owned(), value.to_owned());
        }
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(String::as_str)
    }

    /// 템플릿을 렌더링합니다.
    pub fn render(&self, template: &str) -> Result<String, TemplateError> {
        render(template, self)
    }
}

/// 템플릿을 렌더링합니다.
///
/// # Errors
///
/// 컨텍스트에 없는 변수가 하나라도 있으면 `TemplateError::MissingVariables`
/// (정렬, 중복 제거된 이름 목록)를 반환합니다.
pub fn render(template: &str, ctx: &TemplateContext) -> Result<String, TemplateError> {
    let mut missing = BTreeSet::new();
    let rendered = PLACEHOLDER.replace_all(template, |caps: &Captures<'_>| match caps.get(1) {
        None => "$".to_owned(),
        Some(name) => match ctx.get(name.as_str()) {
            Some(value) => value.to_owned(),
            None => {
                missing.insert(name.as_str().to_owned());
                String::new()
            }
        },
    });

    if missing.is_empty() {
        Ok(rendered.into_owned())
    } else {
        Err(TemplateError::MissingVariables {
            names: missing.into_iter().collect(),
        })
    }
}

/// 템플릿이 참조하는 변수 이름 집합
pub fn placeholders(template: &str) -> BTreeSet<String> {
    PLACEHOLDER
        .captures_iter(template)
        .filter_map(|caps| caps.get(1).map(|m| m.as_str().to_owned()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> TemplateContext {
        let mut ctx = TemplateContext::new();
        ctx.insert("HOST_ADDRESS", "10.0.0.5")
            .insert("WAZUH_API_PASSWORD", "s3cr.t");
        ctx
    }

    #[test]
    fn renders_known_placeholders() {
        let out = ctx()
            .render("https://${HOST_ADDRESS}:55000 pw=${WAZUH_API_PASSWORD}")
            .unwrap();
        assert_eq!(out, "https://10.0.0.5:55000 pw=s3cr.t");
    }

    #[test]
    fn text_without_placeholders_is_unchanged() {
        let input = "plain: value\nlist: [a, b]";
        assert_eq!(ctx().render(input).unwrap(), input);
    }

    #[test]
    fn reports_all_missing_variables_sorted_and_deduplicated() {
        let err = ctx()
            .render("${ZETA} ${ALPHA} ${ZETA} ${HOST_ADDRESS}")
            .unwrap_err();
        match err {
            TemplateError::MissingVariables { names } => {
                assert_eq!(names, vec!["ALPHA".to_owned(), "ZETA".to_owned()]);
            }
        }
    }

    #[test]
    fn double_dollar_escapes() {
        let out = ctx().render("cost: $$5 at ${HOST_ADDRESS}").unwrap();
        assert_eq!(out, "cost: $5 at 10.0.0.5");
    }

    #[test]
    fn lowercase_braces_are_left_alone() {
        // 셸 스타일 소문자 변수는 치환 대상이 아님
        let out = ctx().render("echo ${home}").unwrap();
        assert_eq!(out, "echo ${home}");
    }

    #[test]
    fn values_are_not_re_expanded() {
        let mut ctx = TemplateContext::new();
        ctx.insert("A", "${B}").insert("B", "nope");
        assert_eq!(ctx.render("${A}").unwrap(), "${B}");
    }

    #[test]
    fn placeholders_lists_referenced_names() {
        let names = placeholders("${A} $$ ${B} ${A}");
        assert_eq!(
            names.into_iter().collect::<Vec<_>>(),
            vec!["A".to_owned(), "B".to_owned()]
        );
    }

    #[test]
    fn extend_from_env_adds_all_keys() {
        let env = EnvFile::parse("ONE=1\nTWO=2\n").unwrap();
        let mut ctx = TemplateContext::new();
        ctx.extend_from_env(&env);
        assert_eq!(ctx.render("${ONE}-${TWO}").unwrap(), "1-2");
    }
}
