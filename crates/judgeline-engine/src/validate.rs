//! Execution request validation.

use judgeline_lang::LanguageRegistry;
use judgeline_types::{Language, ResourceParams, Submission, TestFile};

use crate::config::ExecLimits;
use crate::error::ValidationError;

/// Check a request against `limits` and resolve its language.
///
/// Checks run in a fixed order: language, cpu, memory, checker,
/// interactor, test count, then each test file.
pub fn validate_request(
  languages: &dyn LanguageRegistry,
  limits: &ExecLimits,
  submission: &Submission,
  tests: &[TestFile],
  params: &ResourceParams,
) -> Result<Language, ValidationError> {
  let language =
    languages
      .get(&submission.lang_id)
      .ok_or_else(|| ValidationError::UnknownLanguage {
        lang_id: submission.lang_id.clone(),
      })?;

  validate_params(limits, params)?;

  if tests.len() > limits.max_tests {
    return Err(ValidationError::TooManyTests {
      count: tests.len(),
      max: limits.max_tests,
    });
  }

  for (i, test) in tests.iter().enumerate() {
    let test_id = i + 1;
    if test.input().is_none() {
      return Err(ValidationError::MalformedTest {
        test_id,
        side: "input",
      });
    }
    if test.answer().is_none() {
      return Err(ValidationError::MalformedTest {
        test_id,
        side: "answer",
      });
    }
  }

  Ok(language)
}

fn validate_params(limits: &ExecLimits, params: &ResourceParams) -> Result<(), ValidationError> {
  if params.cpu_ms == 0 || params.cpu_ms > limits.max_cpu_ms {
    return Err(ValidationError::CpuLimit {
      cpu_ms: params.cpu_ms,
      max: limits.max_cpu_ms,
    });
  }

  if params.mem_kib == 0 || params.mem_kib > limits.max_mem_kib {
    return Err(ValidationError::MemoryLimit {
      mem_kib: params.mem_kib,
      max: limits.max_mem_kib,
    });
  }

  if let Some(checker) = &params.checker
    && checker.len() > limits.max_checker_bytes
  {
    return Err(ValidationError::CheckerTooLarge {
      size: checker.len(),
      max: limits.max_checker_bytes,
    });
  }

  if let Some(interactor) = &params.interactor
    && interactor.len() > limits.max_interactor_bytes
  {
    return Err(ValidationError::InteractorTooLarge {
      size: interactor.len(),
      max: limits.max_interactor_bytes,
    });
  }

  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use judgeline_lang::StaticLanguageRegistry;

  fn submission(lang_id: &str) -> Submission {
    Submission {
      code: "print(sum(map(int, input().split())))".to_string(),
      lang_id: lang_id.to_string(),
    }
  }

  fn params(cpu_ms: u32, mem_kib: u32) -> ResourceParams {
    ResourceParams {
      cpu_ms,
      mem_kib,
      checker: None,
      interactor: None,
    }
  }

  fn check(
    lang_id: &str,
    tests: &[TestFile],
    params: &ResourceParams,
  ) -> Result<Language, ValidationError> {
    validate_request(
      &StaticLanguageRegistry::builtin(),
      &ExecLimits::default(),
      &submission(lang_id),
      tests,
      params,
    )
  }

  #[test]
  fn test_valid_request_resolves_language() {
    let tests = vec![TestFile::inline("1 2", "3")];
    let language = check("python3.11", &tests, &params(1000, 262_144)).unwrap();
    assert_eq!(language.id, "python3.11");
  }

  #[test]
  fn test_unknown_language() {
    let err = check("cobol", &[], &params(1000, 1024)).unwrap_err();
    assert_eq!(
      err,
      ValidationError::UnknownLanguage {
        lang_id: "cobol".to_string()
      }
    );
  }

  #[test]
  fn test_cpu_bounds() {
    assert!(matches!(
      check("cpp17", &[], &params(0, 1024)),
      Err(ValidationError::CpuLimit { cpu_ms: 0, .. })
    ));
    assert!(matches!(
      check("cpp17", &[], &params(10_001, 1024)),
      Err(ValidationError::CpuLimit { .. })
    ));
    assert!(check("cpp17", &[], &params(10_000, 1024)).is_ok());
  }

  #[test]
  fn test_memory_bounds() {
    assert!(matches!(
      check("cpp17", &[], &params(1000, 2 * 1024 * 1024)),
      Err(ValidationError::MemoryLimit { .. })
    ));
    assert!(matches!(
      check("cpp17", &[], &params(1000, 0)),
      Err(ValidationError::MemoryLimit { .. })
    ));
    assert!(check("cpp17", &[], &params(1000, 1024 * 1024)).is_ok());
  }

  #[test]
  fn test_checker_and_interactor_size() {
    let mut p = params(1000, 1024);
    p.checker = Some("x".repeat(1024 * 1024 + 1));
    assert!(matches!(
      check("cpp17", &[], &p),
      Err(ValidationError::CheckerTooLarge { .. })
    ));

    p.checker = Some("x".repeat(1024 * 1024));
    p.interactor = Some("y".repeat(1024 * 1024 + 1));
    assert!(matches!(
      check("cpp17", &[], &p),
      Err(ValidationError::InteractorTooLarge { .. })
    ));
  }

  #[test]
  fn test_too_many_tests() {
    let tests = vec![TestFile::inline("1", "1"); 201];
    assert!(matches!(
      check("cpp17", &tests, &params(1000, 1024)),
      Err(ValidationError::TooManyTests { count: 201, max: 200 })
    ));
    assert!(check("cpp17", &tests[..200], &params(1000, 1024)).is_ok());
  }

  #[test]
  fn test_malformed_test_reports_position() {
    let tests = vec![
      TestFile::inline("1", "1"),
      TestFile {
        in_content: Some("2".to_string()),
        ans_url: Some("https://tests.example/2.ans".to_string()),
        ..TestFile::default()
      },
    ];
    assert_eq!(
      check("cpp17", &tests, &params(1000, 1024)).unwrap_err(),
      ValidationError::MalformedTest {
        test_id: 2,
        side: "answer"
      }
    );
  }
}
