use crate::error::CalcError;
use crate::value::{Measurement, Value};

use super::Evaluator;

fn eval(line: &str) -> Vec<Value> {
    Evaluator::new()
        .evaluate_line(line)
        .unwrap_or_else(|err| panic!("evaluation of '{line}' failed: {err}"))
}

fn single(line: &str) -> Value {
    let mut values = eval(line);
    assert_eq!(values.len(), 1, "expected one result from '{line}'");
    values.pop().unwrap()
}

fn eval_err(line: &str) -> String {
    Evaluator::new()
        .evaluate_line(line)
        .expect_err(&format!("expected '{line}' to fail"))
        .to_string()
}

fn integers(ns: &[i64]) -> Value {
    Value::list(ns.iter().map(|n| Value::integer(*n)))
}

/// Sequences materialize for comparison; lists pass through.
fn materialized(value: &Value) -> Value {
    match value {
        Value::Sequence(handle) => Value::List(handle.borrow_mut().materialize().unwrap()),
        other => other.clone(),
    }
}

mod stack_tests {
    use super::*;

    #[test]
    fn terms_evaluate_strictly_left_to_right() {
        let values = eval("1 2 3 10 multiply");
        assert_eq!(
            values,
            vec![Value::integer(1), Value::integer(2), Value::integer(30)]
        );
    }

    #[test]
    fn aliases_resolve_before_classification() {
        assert_eq!(single("2 3 +"), Value::integer(5));
        assert_eq!(single("2 3 *"), Value::integer(6));
        assert_eq!(single("9 sqrt"), Value::decimal(3.0));
    }

    #[test]
    fn literals_push_and_operators_pop() {
        assert_eq!(single("2 3 add 4 multiply"), Value::integer(20));
    }

    #[test]
    fn insufficient_operands_name_the_operator_and_index() {
        let message = eval_err("2 add");
        assert!(message.contains("operator 'add' requires 2 arguments"));
        assert!(message.contains("term 2"));
    }

    #[test]
    fn single_argument_arity_message_is_singular() {
        let message = eval_err("factorial");
        assert!(message.contains("requires 1 argument"));
        assert!(!message.contains("arguments"));
    }

    #[test]
    fn unrecognized_terms_suggest_the_nearest_keyword() {
        let message = eval_err("2 sqare");
        assert!(message.contains("unrecognized operator 'sqare'"));
        assert!(message.contains("Did you mean 'square'?"));
    }

    #[test]
    fn unrecognized_alias_suggestions_name_the_target() {
        let message = eval_err("2 sqrtt");
        assert!(message.contains("Did you mean 'sqrt', i.e., an alias for 'root'?"));
    }

    #[test]
    fn errors_discard_the_stack() {
        let mut evaluator = Evaluator::new();
        assert!(evaluator.evaluate_line("1 2 3 frobnicate").is_err());
        // the next evaluation starts from an empty stack
        let values = evaluator.evaluate_line("7").unwrap();
        assert_eq!(values, vec![Value::integer(7)]);
    }
}

mod broadcast_tests {
    use super::*;

    #[test]
    fn unary_operators_distribute_over_lists() {
        assert_eq!(single("[ 1 2 3 ] square"), integers(&[1, 4, 9]));
    }

    #[test]
    fn unary_broadcast_recurses_into_nested_lists() {
        let result = single("[ 1 [ 2 3 ] 4 ] square");
        assert_eq!(
            result,
            Value::list([
                Value::integer(1),
                integers(&[4, 9]),
                Value::integer(16),
            ])
        );
    }

    #[test]
    fn elementwise_binary_addition() {
        assert_eq!(
            single("[ 1 2 3 ] [ 10 20 30 ] add"),
            integers(&[11, 22, 33])
        );
    }

    #[test]
    fn binary_broadcast_is_a_zip_not_a_product() {
        assert_eq!(single("[ 1 2 3 ] [ 10 20 ] add"), integers(&[11, 22]));
        assert_eq!(single("[ 1 2 ] [ 10 20 30 ] add"), integers(&[11, 22]));
    }

    #[test]
    fn scalars_hold_fixed_against_a_list() {
        assert_eq!(single("10 [ 1 2 3 ] add"), integers(&[11, 12, 13]));
        assert_eq!(single("[ 1 2 3 ] 10 add"), integers(&[11, 12, 13]));
    }

    #[test]
    fn one_element_lists_unwrap_to_scalars() {
        assert_eq!(single("[ 5 ] [ 1 2 3 ] add"), integers(&[6, 7, 8]));
        assert_eq!(single("[ 2 ] [ 3 ] add"), Value::integer(5));
    }

    #[test]
    fn nested_lists_zip_recursively() {
        assert_eq!(
            single("[ [ 1 2 ] [ 3 4 ] ] [ 10 20 ] add"),
            Value::list([integers(&[11, 12]), integers(&[23, 24])])
        );
    }

    #[test]
    fn ternary_operators_zip_across_scalar_mixes() {
        let result = single("[ 2024 2025 ] 3 15 make_datetime");
        match result {
            Value::List(elements) => {
                assert_eq!(elements.len(), 2);
                assert!(matches!(elements[0], Value::DateTime(_)));
            }
            other => panic!("expected a list of date-times, got {other:?}"),
        }
    }

    #[test]
    fn echo_side_effects_come_before_results() {
        let values = eval("5 echo square");
        assert_eq!(values, vec![Value::integer(5), Value::integer(25)]);
    }
}

mod sequence_tests {
    use super::*;

    #[test]
    fn range_broadcast_materializes_to_the_result_list() {
        assert_eq!(
            single("1 10 range square"),
            integers(&[1, 4, 9, 16, 25, 36, 49, 64, 81, 100])
        );
    }

    #[test]
    fn range_feeds_list_operators() {
        assert_eq!(single("1 100 range sum"), Value::integer(5050));
    }

    #[test]
    fn generator_operators_see_the_same_elements_lazy_or_eager() {
        assert_eq!(single("1 5 range count"), Value::integer(5));
        assert_eq!(single("[ 1 2 3 4 5 ] count"), Value::integer(5));
    }

    #[test]
    fn interval_range_honors_the_step() {
        assert_eq!(
            materialized(&single("1 10 2 interval_range")),
            integers(&[1, 3, 5, 7, 9])
        );
    }

    #[test]
    fn geometric_range_multiplies_forward() {
        assert_eq!(
            materialized(&single("2 3 4 geometric_range")),
            integers(&[2, 6, 18, 54])
        );
    }

    #[test]
    fn indexed_access_is_zero_based() {
        assert_eq!(single("1 100 range 4 element"), Value::integer(5));
    }

    #[test]
    fn indexed_access_past_the_end_fails() {
        let message = eval_err("[ 1 2 ] 7 element");
        assert!(message.contains("out of range"));
    }

    #[test]
    fn filter_keeps_elements_with_nonzero_predicate() {
        assert_eq!(
            materialized(&single("1 10 range lambda x 2 modulo filter")),
            integers(&[1, 3, 5, 7, 9])
        );
    }

    #[test]
    fn unfilter_inverts_the_predicate() {
        assert_eq!(
            materialized(&single("1 10 range lambda x 2 modulo unfilter")),
            integers(&[2, 4, 6, 8, 10])
        );
    }

    #[test]
    fn for_each_list_maps_lazily() {
        assert_eq!(
            materialized(&single("1 5 range lambda x square for_each_list")),
            integers(&[1, 4, 9, 16, 25])
        );
    }

    #[test]
    fn scalars_coerce_to_sequences_for_generator_slots() {
        assert_eq!(single("7 count"), Value::integer(1));
    }
}

mod lambda_tests {
    use super::*;

    #[test]
    fn single_placeholder_functions_apply() {
        assert_eq!(single("3 lambda x square eval"), Value::integer(9));
        assert_eq!(single("5 lambda x 2 multiply eval"), Value::integer(10));
    }

    #[test]
    fn two_placeholder_functions_use_eval2() {
        assert_eq!(single("3 4 lambda x y add eval2"), Value::integer(7));
    }

    #[test]
    fn three_placeholder_functions_use_eval3() {
        assert_eq!(
            single("2 3 4 lambda x y multiply z add eval3"),
            Value::integer(10)
        );
    }

    #[test]
    fn a_body_with_no_placeholder_has_arity_zero() {
        assert_eq!(single("lambda 2 3 add eval0"), Value::integer(5));
    }

    #[test]
    fn functions_broadcast_over_list_arguments() {
        assert_eq!(single("[ 1 2 3 ] lambda x square eval"), integers(&[1, 4, 9]));
    }

    #[test]
    fn functions_broadcast_over_sequence_arguments() {
        assert_eq!(single("1 3 range lambda x square eval"), integers(&[1, 4, 9]));
    }

    #[test]
    fn list_literals_inside_bodies() {
        assert_eq!(single("5 lambda [ x x ] sum eval"), Value::integer(10));
    }

    #[test]
    fn placeholders_outside_a_lambda_are_rejected() {
        let message = eval_err("3 x add");
        assert!(message.contains("lambda"));
    }

    #[test]
    fn function_operators_require_a_lambda() {
        let message = eval_err("3 4 eval");
        assert!(message.contains("function operators require a function definition"));
    }

    #[test]
    fn nested_lambdas_are_rejected_before_evaluation() {
        let err = Evaluator::new()
            .evaluate_line("lambda lambda x add eval")
            .unwrap_err();
        assert!(matches!(err, CalcError::Validate(_)));
        assert!(err.to_string().contains("nested function declarations"));
    }

    #[test]
    fn unterminated_lambda_is_rejected_before_evaluation() {
        let err = Evaluator::new().evaluate_line("lambda x square").unwrap_err();
        assert!(matches!(err, CalcError::Validate(_)));
        assert!(err
            .to_string()
            .contains("unexpected end of input in function definition"));
    }

    #[test]
    fn named_functions_apply_by_reference() {
        let mut evaluator = Evaluator::new();
        evaluator.define_function("double", &["x", "2", "multiply"]);
        let values = evaluator.evaluate_line("5 @double").unwrap();
        assert_eq!(values, vec![Value::integer(10)]);
    }

    #[test]
    fn named_functions_inline_into_lambda_bodies() {
        let mut evaluator = Evaluator::new();
        evaluator.define_function("double", &["x", "2", "multiply"]);
        let values = evaluator.evaluate_line("3 lambda x @double 1 add eval").unwrap();
        assert_eq!(values, vec![Value::integer(7)]);
    }

    #[test]
    fn undefined_function_references_fail() {
        let message = eval_err("5 @missing");
        assert!(message.contains("undefined function 'missing'"));
    }

    #[test]
    fn compiled_bodies_are_reused_across_invocations() {
        let mut evaluator = Evaluator::new();
        evaluator.define_function("triple", &["x", "3", "multiply"]);
        assert_eq!(
            evaluator.evaluate_line("1 @triple").unwrap(),
            vec![Value::integer(3)]
        );
        assert_eq!(
            evaluator.evaluate_line("7 @triple").unwrap(),
            vec![Value::integer(21)]
        );
    }
}

mod modifier_tests {
    use super::*;

    #[test]
    fn brackets_build_nested_lists() {
        assert_eq!(
            single("[ 1 [ 2 3 ] 4 ]"),
            Value::list([
                Value::integer(1),
                integers(&[2, 3]),
                Value::integer(4),
            ])
        );
    }

    #[test]
    fn unbalanced_brackets_are_rejected_before_evaluation() {
        let err = Evaluator::new().evaluate_line("[ 1 2").unwrap_err();
        assert!(matches!(err, CalcError::Validate(_)));
        assert_eq!(err.to_string(), "mismatched brackets (count: 1)");
    }

    #[test]
    fn early_close_bracket_is_a_runtime_error() {
        let message = eval_err("] [");
        assert!(message.contains("too many ']'s"));
    }

    #[test]
    fn duplicate_term_repeats_the_value() {
        let values = eval("5 3 duplicate_term");
        assert_eq!(
            values,
            vec![Value::integer(5), Value::integer(5), Value::integer(5)]
        );
    }

    #[test]
    fn duplicate_term_splices_list_elements() {
        let values = eval("[ 1 2 ] 2 duplicate_term");
        assert_eq!(values, [1, 2, 1, 2].map(Value::integer).to_vec());
    }

    #[test]
    fn duplicate_operator_repeats_the_next_operation() {
        // 2 squared five times over
        assert_eq!(
            single("2 5 duplicate_operator square"),
            Value::integer(4294967296_i64)
        );
    }

    #[test]
    fn duplicate_operator_restores_the_second_operand() {
        // 4 * 6, five times against the original 6
        assert_eq!(
            single("4 6 5 duplicate_operator multiply"),
            Value::integer(31104)
        );
    }

    #[test]
    fn duplicate_operator_rejects_lists() {
        let message = eval_err("[ 1 2 ] duplicate_operator add");
        assert!(message.contains("cannot accept a list argument"));
    }

    #[test]
    fn duplicate_operator_must_be_consumed() {
        let message = eval_err("1 2 2 duplicate_operator 3 duplicate_operator add");
        assert!(message.contains("must be followed by another operation"));
    }

    #[test]
    fn previous_copies_the_top_without_popping() {
        assert_eq!(single("5 previous multiply"), Value::integer(25));
    }

    #[test]
    fn unlist_flattens_one_level() {
        let values = eval("[ 1 2 ] unlist");
        assert_eq!(values, vec![Value::integer(1), Value::integer(2)]);
        // scalars pass through unchanged
        assert_eq!(eval("5 unlist"), vec![Value::integer(5)]);
    }

    #[test]
    fn operator_lists_collect_each_application() {
        assert_eq!(
            single("2 3 ( add subtract multiply )"),
            integers(&[5, -1, 6])
        );
    }

    #[test]
    fn operator_lists_fork_sequence_operands() {
        // both operators consume the same range independently
        assert_eq!(single("1 3 range ( sum product )"), integers(&[6, 6]));
    }

    #[test]
    fn operator_lists_reject_plain_values() {
        let message = eval_err("2 ( 3 )");
        assert!(message.contains("only operators may appear inside an operator list"));
    }

    #[test]
    fn nested_operator_lists_are_rejected_before_evaluation() {
        let err = Evaluator::new().evaluate_line("2 ( ( add ) )").unwrap_err();
        assert!(matches!(err, CalcError::Validate(_)));
    }

    #[test]
    fn unterminated_operator_list_is_rejected() {
        let err = Evaluator::new().evaluate_line("2 3 ( add").unwrap_err();
        assert!(err.to_string().contains("mismatched parentheses"));
    }

    #[test]
    fn set_variable_stores_and_references_read_back() {
        let mut evaluator = Evaluator::new();
        let values = evaluator.evaluate_line("\"limit\" 100 set").unwrap();
        assert_eq!(values, vec![Value::integer(100)]);
        let values = evaluator.evaluate_line("$limit 2 multiply").unwrap();
        assert_eq!(values, vec![Value::integer(200)]);
    }

    #[test]
    fn undefined_variables_fail() {
        let message = eval_err("$missing 1 add");
        assert!(message.contains("undefined variable 'missing'"));
    }
}

mod unit_tests {
    use super::*;

    #[test]
    fn units_attach_to_the_preceding_number() {
        assert_eq!(
            single("5 meters"),
            Value::Measurement(Measurement::new(Value::integer(5), "meter"))
        );
    }

    #[test]
    fn a_bare_unit_gets_a_value_of_one() {
        assert_eq!(
            single("meter"),
            Value::Measurement(Measurement::new(Value::integer(1), "meter"))
        );
    }

    #[test]
    fn units_apply_to_every_list_element() {
        let result = single("[ 1 2 ] meters");
        assert_eq!(
            result,
            Value::list([
                Value::Measurement(Measurement::new(Value::integer(1), "meter")),
                Value::Measurement(Measurement::new(Value::integer(2), "meter")),
            ])
        );
    }

    #[test]
    fn same_unit_measurements_add() {
        assert_eq!(
            single("5 meters 3 meters add"),
            Value::Measurement(Measurement::new(Value::integer(8), "meter"))
        );
    }

    #[test]
    fn mixed_unit_addition_fails() {
        let message = eval_err("5 meters 3 seconds add");
        assert!(message.contains("cannot add"));
    }

    #[test]
    fn constants_push_their_value() {
        assert_eq!(single("true"), Value::integer(1));
        assert_eq!(single("october"), Value::integer(10));
        match single("pi") {
            Value::Decimal(n) => assert!((n.0 - std::f64::consts::PI).abs() < 1e-12),
            other => panic!("expected a decimal, got {other:?}"),
        }
    }

    #[test]
    fn datetime_plus_time_measurement_shifts() {
        let result = single("2024-03-15 1 day add");
        assert_eq!(result.to_string(), "2024-03-16");
    }

    #[test]
    fn datetime_difference_is_seconds() {
        assert_eq!(
            single("2024-03-16 2024-03-15 subtract"),
            Value::Measurement(Measurement::new(Value::decimal(86400.0), "seconds"))
        );
    }

    #[test]
    fn make_datetime_builds_midnight() {
        assert_eq!(single("2024 3 15 make_datetime").to_string(), "2024-03-15");
    }
}

mod configuration_tests {
    use super::*;
    use crate::cache::{MemoryCache, OperatorCache};
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn input_radix_threads_through_literal_parsing() {
        let mut evaluator = Evaluator::new();
        evaluator.set_input_radix(16);
        let values = evaluator.evaluate_line("ff 1 add").unwrap();
        assert_eq!(values, vec![Value::integer(256)]);
    }

    #[test]
    fn operator_names_win_over_radix_digits() {
        // 'add' is a valid base-16 numeral but stays an operator
        let mut evaluator = Evaluator::new();
        evaluator.set_input_radix(16);
        let values = evaluator.evaluate_line("a b add").unwrap();
        assert_eq!(values, vec![Value::integer(21)]);
    }

    #[test]
    fn cache_is_shared_across_evaluations() {
        let cache = Rc::new(RefCell::new(MemoryCache::new()));
        let shared: Rc<RefCell<dyn OperatorCache>> = cache.clone();
        let mut evaluator = Evaluator::with_cache(shared);

        evaluator.evaluate_line("30 fibonacci").unwrap();
        assert_eq!(cache.borrow().len(), 1);
        evaluator.evaluate_line("30 fibonacci").unwrap();
        assert_eq!(cache.borrow().len(), 1);
    }

    #[test]
    fn hex_literals_in_decimal_radix() {
        assert_eq!(single("0x10 2 multiply"), Value::integer(32));
    }

    #[test]
    fn complex_literals_combine_with_reals() {
        assert_eq!(single("3i 4 add"), Value::complex(4.0, 3.0));
        assert_eq!(single("-4 sqrt"), Value::complex(0.0, 2.0));
    }

    #[test]
    fn string_equality_compares_contents() {
        assert_eq!(single("\"abc\" \"abc\" is_equal"), Value::integer(1));
        assert_eq!(single("\"abc\" \"abd\" is_equal"), Value::integer(0));
    }
}

mod list_operator_tests {
    use super::*;

    #[test]
    fn aggregations() {
        assert_eq!(single("[ 1 2 3 4 ] sum"), Value::integer(10));
        assert_eq!(single("[ 1 2 3 4 ] product"), Value::integer(24));
        assert_eq!(single("[ 1 2 3 4 ] mean"), Value::decimal(2.5));
        assert_eq!(single("[ 3 1 2 ] minimum"), Value::integer(1));
        assert_eq!(single("[ 3 1 2 ] maximum"), Value::integer(3));
    }

    #[test]
    fn aggregations_recurse_into_sublists() {
        assert_eq!(single("[ [ 1 2 ] [ 3 4 ] ] sum"), integers(&[3, 7]));
        assert_eq!(single("[ [ 1 2 ] [ 3 4 ] ] product"), integers(&[2, 12]));
    }

    #[test]
    fn scalars_coerce_to_one_element_lists() {
        assert_eq!(single("5 sum"), Value::integer(5));
        assert_eq!(single("5 sort"), integers(&[5]));
    }

    #[test]
    fn reordering() {
        assert_eq!(single("[ 3 1 2 ] sort"), integers(&[1, 2, 3]));
        assert_eq!(single("[ 1 2 3 ] reverse"), integers(&[3, 2, 1]));
        assert_eq!(single("[ 1 2 1 3 2 ] unique"), integers(&[1, 2, 3]));
    }

    #[test]
    fn flatten_goes_all_the_way_down() {
        assert_eq!(
            single("[ 1 [ 2 [ 3 4 ] ] 5 ] flatten"),
            integers(&[1, 2, 3, 4, 5])
        );
    }

    #[test]
    fn slicing() {
        assert_eq!(single("[ 1 2 3 4 5 ] 2 left"), integers(&[1, 2]));
        assert_eq!(single("[ 1 2 3 4 5 ] 2 right"), integers(&[4, 5]));
    }

    #[test]
    fn interleave_alternates_elements() {
        assert_eq!(
            single("[ 1 3 5 ] [ 2 4 6 ] interleave"),
            integers(&[1, 2, 3, 4, 5, 6])
        );
    }

    #[test]
    fn sort_rejects_incomparable_elements() {
        let message = eval_err("[ 1 \"a\" ] sort");
        assert!(message.contains("cannot compare"));
    }
}
