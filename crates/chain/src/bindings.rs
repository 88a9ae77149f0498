//! Typed bindings for the three aggregator schema generations.
//!
//! Three incompatible on-chain schemas are in circulation: the legacy
//! request/response aggregator, the v2 aggregator interface, and the flux
//! aggregator. The adapters in [`crate::adapter`] normalize them; this module
//! only declares the raw surfaces.

use alloy::sol;

// Legacy aggregator (schema version 1). Answers are requested via the
// oracle-request cycle; the current pending answer id lives in a raw storage
// slot rather than behind an accessor.
sol! {
    #[sol(rpc)]
    interface IAggregatorLegacy {
        function currentAnswer() external view returns (int256);
        function updatedHeight() external view returns (uint256);
        function latestCompletedAnswer() external view returns (uint256);
        function minimumResponses() external view returns (uint256);
        function oracles(uint256 index) external view returns (address);
        function getAnswer(uint256 answerId) external view returns (int256);
        function getTimestamp(uint256 answerId) external view returns (uint256);

        event ResponseReceived(int256 indexed response, int256 indexed answerId, address indexed sender);
        event AnswerUpdated(int256 indexed current, uint256 indexed roundId, uint256 updatedAt);
        event ChainlinkRequested(bytes32 indexed id);
    }
}

// Aggregator interface (schema version 2). Same pending-round storage quirk
// as the legacy schema, but direct accessors for answer and timestamp.
sol! {
    #[sol(rpc)]
    interface IAggregatorV2 {
        function latestAnswer() external view returns (int256);
        function latestTimestamp() external view returns (uint256);
        function latestRound() external view returns (uint256);
        function minimumResponses() external view returns (uint256);
        function oracles(uint256 index) external view returns (address);
        function getAnswer(uint256 roundId) external view returns (int256);
        function getTimestamp(uint256 roundId) external view returns (uint256);
        function decimals() external view returns (uint8);
        function description() external view returns (string memory);

        event AnswerUpdated(int256 indexed current, uint256 indexed roundId, uint256 updatedAt);
    }
}

// Flux aggregator (schema version 3). Oracles push submissions directly;
// rounds are first-class with their own start events.
sol! {
    #[sol(rpc)]
    interface IFluxAggregator {
        function latestAnswer() external view returns (int256);
        function latestTimestamp() external view returns (uint256);
        function latestRound() external view returns (uint256);
        function reportingRound() external view returns (uint32);
        function minAnswerCount() external view returns (uint32);
        function getOracles() external view returns (address[] memory);
        function getAnswer(uint256 roundId) external view returns (int256);
        function getTimestamp(uint256 roundId) external view returns (uint256);
        function decimals() external view returns (uint8);
        function description() external view returns (string memory);
        function oracleRoundState(address oracle, uint32 queriedRoundId) external view returns (
            bool eligibleToSubmit,
            uint32 roundId,
            int256 latestSubmission,
            uint64 startedAt,
            uint64 timeout,
            uint128 availableFunds,
            uint8 oracleCount,
            uint128 paymentAmount
        );

        event SubmissionReceived(int256 indexed submission, uint32 indexed round, address indexed oracle);
        event AnswerUpdated(int256 indexed current, uint256 indexed roundId, uint256 updatedAt);
        event NewRound(uint256 indexed roundId, address indexed startedBy, uint256 startedAt);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::sol_types::SolEvent;

    #[test]
    fn test_answer_updated_signature_is_shared() {
        // All three generations emit the same AnswerUpdated shape, which is
        // what makes a version-independent history fetch possible.
        assert_eq!(
            IAggregatorLegacy::AnswerUpdated::SIGNATURE_HASH,
            IAggregatorV2::AnswerUpdated::SIGNATURE_HASH,
        );
        assert_eq!(
            IAggregatorV2::AnswerUpdated::SIGNATURE_HASH,
            IFluxAggregator::AnswerUpdated::SIGNATURE_HASH,
        );
    }

    #[test]
    fn test_event_signatures_are_distinct() {
        let sigs = [
            IAggregatorLegacy::ResponseReceived::SIGNATURE_HASH,
            IAggregatorLegacy::ChainlinkRequested::SIGNATURE_HASH,
            IFluxAggregator::SubmissionReceived::SIGNATURE_HASH,
            IFluxAggregator::NewRound::SIGNATURE_HASH,
            IFluxAggregator::AnswerUpdated::SIGNATURE_HASH,
        ];
        for (i, a) in sigs.iter().enumerate() {
            for b in sigs.iter().skip(i + 1) {
                assert_ne!(a, b);
            }
        }
    }
}
