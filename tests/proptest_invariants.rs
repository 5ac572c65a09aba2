//! Property-based invariant tests: frame codec, the order state table and fill accounting.

use chrono::Utc;
use order_gateway::instrument::InstrumentTraits;
use order_gateway::wire::codec::{
    decode_request, decode_response, encode_request, encode_response, CodecError,
};
use order_gateway::wire::message::{
    AccountReport, AlterOrder, BatchCancel, BatchChild, ErrorReport, EtfComponentReport,
    InsertBatchOrder, InsertOrder, InstrumentEntry, InstrumentReport, OrderActionReport,
    PendingOrder, PositionEntry, PositionReport, QueryOrderReport, RequestBody, RequestEnvelope,
    ResponseBody, ResponseEnvelope, TradeReport,
};
use order_gateway::{
    ErrorKind, Order, OrderAction, OrderError, OrderExecutionInfo, OrderState, StrategyRef,
};
use proptest::prelude::*;
use rust_decimal::Decimal;

fn any_state() -> impl Strategy<Value = OrderState> {
    prop::sample::select(OrderState::ALL.to_vec())
}

fn any_trading_action() -> impl Strategy<Value = OrderAction> {
    prop::sample::select(vec![
        OrderAction::Buy,
        OrderAction::Sell,
        OrderAction::BuyToCover,
        OrderAction::SellShort,
    ])
}

fn any_action() -> impl Strategy<Value = OrderAction> {
    prop::sample::select(vec![
        OrderAction::Buy,
        OrderAction::Sell,
        OrderAction::BuyToCover,
        OrderAction::SellShort,
        OrderAction::EtfCreate,
        OrderAction::EtfRedeem,
    ])
}

fn any_decimal() -> impl Strategy<Value = Decimal> {
    (-1_000_000_000i64..1_000_000_000, 0u32..6).prop_map(|(n, scale)| Decimal::new(n, scale))
}

fn any_text() -> impl Strategy<Value = String> {
    "[A-Za-z0-9._-]{0,12}"
}

fn any_insert() -> impl Strategy<Value = InsertOrder> {
    (
        "[0-9]{6}\\.(SH|SZ)",
        any_action(),
        any_decimal(),
        any_decimal(),
        0u64..86_400,
        prop::option::of(any_decimal()),
    )
        .prop_map(|(ticker, action, price, quantity, expire_secs, min_exchange_unit)| {
            InsertOrder { ticker, action, price, quantity, expire_secs, min_exchange_unit }
        })
}

fn any_child() -> impl Strategy<Value = BatchChild> {
    (any_text(), any_text(), any_action(), any_decimal(), any_decimal(), 0u64..86_400).prop_map(
        |(strategy_order_ref, ticker, action, price, quantity, expire_secs)| BatchChild {
            strategy_order_ref,
            ticker,
            action,
            price,
            quantity,
            expire_secs,
        },
    )
}

fn any_request_body() -> impl Strategy<Value = RequestBody> {
    prop_oneof![
        any_insert().prop_map(RequestBody::InsertOrder),
        prop::collection::vec(any_child(), 0..5)
            .prop_map(|orders| RequestBody::InsertBatchOrder(InsertBatchOrder { orders })),
        any_text().prop_map(|r| RequestBody::AlterOrder(AlterOrder { strategy_order_ref: r })),
        prop::collection::vec(any_text(), 0..6).prop_map(|refs| {
            RequestBody::BatchCancel(BatchCancel { strategy_order_refs: refs })
        }),
        Just(RequestBody::QueryPosition),
        Just(RequestBody::QueryOrder),
        Just(RequestBody::QueryTrade),
        Just(RequestBody::QueryInstrument),
        Just(RequestBody::QueryAccount),
    ]
}

fn any_request() -> impl Strategy<Value = RequestEnvelope> {
    (any_text(), any_text(), any::<i64>(), any_request_body()).prop_map(
        |(req_id, logic_id, timestamp_ms, body)| RequestEnvelope {
            req_id,
            logic_id,
            timestamp_ms,
            body,
        },
    )
}

fn any_trade() -> impl Strategy<Value = ResponseBody> {
    (
        (any_text(), any_text(), any_text(), any_text(), any_text()),
        (any_action(), any_decimal(), any_decimal(), any_decimal(), any::<i64>(), any::<bool>()),
    )
        .prop_map(
            |(
                (account_name, strategy_order_ref, exchange_order_ref, exchange_trade_ref, ticker),
                (action, price, quantity, commission, timestamp_ms, if_last),
            )| {
                ResponseBody::OnTrade(TradeReport {
                    account_name,
                    strategy_order_ref,
                    exchange_order_ref,
                    exchange_trade_ref,
                    ticker,
                    action,
                    price,
                    quantity,
                    commission,
                    timestamp_ms,
                    if_last,
                })
            },
        )
}

fn any_pending() -> impl Strategy<Value = PendingOrder> {
    (
        (any_text(), any_text(), any_text(), any_action()),
        (any_decimal(), any_decimal(), any_decimal(), any_state(), any::<i64>()),
    )
        .prop_map(
            |(
                (strategy_order_ref, exchange_order_ref, ticker, action),
                (price, quantity, filled, state, create_time_ms),
            )| PendingOrder {
                strategy_order_ref,
                exchange_order_ref,
                ticker,
                action,
                price,
                quantity,
                filled,
                state,
                create_time_ms,
            },
        )
}

fn any_position() -> impl Strategy<Value = PositionEntry> {
    (any_text(), prop::array::uniform6(any_decimal())).prop_map(|(ticker, d)| PositionEntry {
        ticker,
        long_holding: d[0],
        long_available: d[1],
        long_avg_cost: d[2],
        short_holding: d[3],
        short_available: d[4],
        short_avg_cost: d[5],
    })
}

fn any_account() -> impl Strategy<Value = ResponseBody> {
    (any_text(), any_text(), any::<i64>(), prop::array::uniform8(any_decimal())).prop_map(
        |(account_name, currency, update_time_ms, d)| {
            ResponseBody::OnQueryAccount(AccountReport {
                account_name,
                currency,
                update_time_ms,
                balance: d[0],
                cash: d[1],
                cash_available: d[2],
                margin: d[3],
                unrealized_pnl: d[4],
                realized_pnl: d[5],
                total_asset: d[6],
                withdrawable: d[7],
            })
        },
    )
}

fn any_instrument() -> impl Strategy<Value = InstrumentEntry> {
    (
        any_text(),
        prop::array::uniform4(any_decimal()),
        0u32..10,
        (any_text(), any_text(), any_text()),
    )
        .prop_map(|(ticker, d, quote_precision, (base, quote, exchange_name))| InstrumentEntry {
            ticker,
            trade_unit: d[0],
            price_tick: d[1],
            min_order_volume: d[2],
            max_order_volume: d[3],
            quote_precision,
            base,
            quote,
            exchange_name,
        })
}

fn any_response_body() -> impl Strategy<Value = ResponseBody> {
    prop_oneof![
        any_trade(),
        (any_text(), any_text(), any_text(), any_state(), prop::option::of(any_action())).prop_map(
            |(account_name, strategy_order_ref, exchange_order_ref, state, action)| {
                ResponseBody::OnOrderAction(OrderActionReport {
                    account_name,
                    strategy_order_ref,
                    exchange_order_ref,
                    state,
                    action,
                })
            }
        ),
        (any_text(), any::<i64>(), prop::collection::vec(any_pending(), 0..4)).prop_map(
            |(account_name, update_time_ms, pending_orders)| {
                ResponseBody::OnQueryOrder(QueryOrderReport {
                    account_name,
                    update_time_ms,
                    pending_orders,
                })
            }
        ),
        (any_text(), any::<i64>(), prop::collection::vec(any_position(), 0..4)).prop_map(
            |(account_name, update_time_ms, positions)| {
                ResponseBody::OnQueryPosition(PositionReport {
                    account_name,
                    update_time_ms,
                    positions,
                })
            }
        ),
        any_account(),
        prop::collection::vec(any_instrument(), 0..4).prop_map(|instruments| {
            ResponseBody::OnQueryInstrument(InstrumentReport { instruments })
        }),
        any_error(),
        any_etf_component(),
    ]
}

fn any_error() -> impl Strategy<Value = ResponseBody> {
    let kind = prop::sample::select(ErrorKind::ALL.to_vec());
    (any_text(), kind, any_text(), any_text(), any_text()).prop_map(
        |(account_name, kind, msg, strategy_order_ref, exchange_order_ref)| {
            ResponseBody::OnError(ErrorReport {
                account_name,
                kind,
                msg,
                strategy_order_ref,
                exchange_order_ref,
            })
        },
    )
}

fn any_etf_component() -> impl Strategy<Value = ResponseBody> {
    (any_text(), any_text(), any_text(), any_text(), any_decimal(), any_text()).prop_map(
        |(account_name, strategy_order_ref, etf_ticker, component_ticker, quantity, exchange_ref)| {
            ResponseBody::EtfConvertComponent(EtfComponentReport {
                account_name,
                strategy_order_ref,
                etf_ticker,
                component_ticker,
                quantity,
                exchange_order_ref: exchange_ref,
            })
        },
    )
}

fn any_response() -> impl Strategy<Value = ResponseEnvelope> {
    (any_text(), any::<i64>(), any_response_body()).prop_map(|(resp_id, timestamp_ms, body)| {
        ResponseEnvelope { resp_id, timestamp_ms, body }
    })
}

fn accepted_order(qty: i64, price_cents: i64) -> Order {
    let now = Utc::now();
    let mut order = Order::limit(
        OrderAction::Buy,
        "600000.SH",
        Decimal::new(price_cents, 2),
        Decimal::from(qty),
        InstrumentTraits::stock(),
        now,
    )
    .unwrap();
    order.submit(StrategyRef::from("p1"), now).unwrap();
    order.accept(now).unwrap();
    order
}

fn fill(qty: i64, price_cents: i64, n: usize) -> OrderExecutionInfo {
    OrderExecutionInfo {
        price: Decimal::new(price_cents, 2),
        quantity: Decimal::from(qty),
        commission: Decimal::new(5, 1),
        timestamp: Utc::now(),
        exchange_trade_ref: format!("t{}", n),
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Any request survives a frame round trip; every strict prefix is reported incomplete.
    #[test]
    fn prop_request_frames_decode_or_report_incomplete(
        request in any_request(),
        cut in 0usize..256,
    ) {
        let frame = encode_request(&request).unwrap();
        let (decoded, consumed) = decode_request(&frame).unwrap();
        prop_assert_eq!(consumed, frame.len());
        prop_assert_eq!(&decoded, &request);
        prop_assert_eq!(decoded.head(), request.head());

        let prefix = &frame[..cut.min(frame.len() - 1)];
        let incomplete = matches!(decode_request(prefix), Err(CodecError::Incomplete { .. }));
        prop_assert!(incomplete);
    }

    /// Any response survives a frame round trip and is never read as a request.
    #[test]
    fn prop_response_frames_round_trip(response in any_response()) {
        let frame = encode_response(&response).unwrap();
        let (decoded, consumed) = decode_response(&frame).unwrap();
        prop_assert_eq!(consumed, frame.len());
        prop_assert_eq!(decoded, response);
        prop_assert!(decode_request(&frame).is_err());
    }

    /// A quantity off the trade-unit grid never builds an order; on-grid quantities always do.
    #[test]
    fn prop_order_quantity_sits_on_the_trade_unit(
        whole in 0i64..10_000,
        tenths in 0i64..10,
        action in any_trading_action(),
    ) {
        let quantity = Decimal::new(whole * 10 + tenths, 1);
        let result = Order::limit(
            action,
            "600000.SH",
            Decimal::ONE,
            quantity,
            InstrumentTraits::stock(),
            Utc::now(),
        );
        if whole > 0 && tenths == 0 {
            let order = result.unwrap();
            prop_assert_eq!(order.remaining(), quantity);
        } else {
            prop_assert_eq!(result.unwrap_err(), OrderError::InvalidQuantity(quantity));
        }
    }

    /// Random transition attempts only ever follow the table, and terminal states stick.
    #[test]
    fn prop_state_changes_follow_the_table(targets in prop::collection::vec(any_state(), 1..40)) {
        let mut order = accepted_order(1_000, 1_000);
        for to in targets {
            let from = order.state();
            let result = order.switch_state(to);
            prop_assert_eq!(result.is_ok(), from.can_transition_to(to));
            if result.is_ok() {
                prop_assert_eq!(order.state(), to);
            } else {
                prop_assert_eq!(order.state(), from);
            }
            if from.is_terminal() {
                prop_assert_eq!(order.state(), from);
            }
        }
    }

    /// Filled only grows, plus remaining it equals quantity, the average is the weighted mean of
    /// applied fills, and FILLED holds exactly when nothing remains.
    #[test]
    fn prop_fills_conserve_quantity(
        qty in 1i64..5_000,
        fills in prop::collection::vec((1i64..2_000, 100i64..2_000), 1..20),
    ) {
        let mut order = accepted_order(qty, 1_000);
        let mut notional = Decimal::ZERO;
        for (n, (fill_qty, price)) in fills.into_iter().enumerate() {
            let before = (order.filled(), order.state());
            let result = order.add_execution_info(fill(fill_qty, price, n));
            if result.is_err() {
                prop_assert_eq!((order.filled(), order.state()), before);
            } else {
                notional += Decimal::new(price, 2) * Decimal::from(fill_qty);
            }
            prop_assert!(order.filled() >= before.0);
            if let Some(avg) = order.avg_fill_price() {
                let expected = notional / order.filled();
                prop_assert!((avg - expected).abs() < Decimal::new(1, 12));
            }
            prop_assert_eq!(order.filled() + order.remaining(), order.quantity());
            prop_assert!(order.filled() <= order.quantity());
            prop_assert_eq!(order.state() == OrderState::Filled, order.remaining().is_zero());
        }
    }

    /// Replaying cumulative reports as increments reproduces the cumulative totals.
    #[test]
    fn prop_cumulative_reports_reduce_to_increments(
        steps in prop::collection::vec(0i64..300, 1..12),
        price_cents in 100i64..5_000,
    ) {
        let total: i64 = steps.iter().sum::<i64>().max(1);
        let mut order = accepted_order(total, price_cents);
        let mut cumulative = 0i64;
        for (n, step) in steps.into_iter().enumerate() {
            cumulative += step;
            let increment = order.incremental_from_cumulative(
                Decimal::from(cumulative),
                Decimal::new(price_cents, 2),
                Decimal::from(n as i64),
                Utc::now(),
                format!("t{}", n),
            );
            match increment {
                None => prop_assert_eq!(order.filled(), Decimal::from(cumulative)),
                Some(info) => {
                    prop_assert_eq!(info.quantity, Decimal::from(step));
                    prop_assert_eq!(info.price, Decimal::new(price_cents, 2));
                    order.add_execution_info(info).unwrap();
                    prop_assert_eq!(order.filled(), Decimal::from(cumulative));
                    prop_assert_eq!(order.commissions(), Decimal::from(n as i64));
                }
            }
        }
    }
}

#[test]
fn canceled_order_rejects_late_fills() {
    let mut order = accepted_order(100, 1_000);
    order.switch_state(OrderState::Canceled).unwrap();
    assert!(order.add_execution_info(fill(10, 1_000, 0)).is_err());
    assert_eq!(order.filled(), Decimal::ZERO);
}
