//! Deployment descriptors and the order in which they are deployed.
//!
//! A [`DeploymentPlan`] is an ordered list of [`Descriptor`]s. A descriptor may
//! reference the address of another contract through
//! [`ConstructorArg::AddressOf`]; such references are the only dependencies
//! between deployments and must always point backwards in the plan.

use std::{
    collections::{BTreeMap, HashSet},
    fmt,
};

use alloy_core::primitives::{Address, U256};
use derive_more::Deref;
use serde::{Deserialize, Serialize};

use crate::DeployError;

/// The contracts known to the deployment harness.
///
/// The display form is the Solidity contract name, which is also how the
/// compilation artifacts are looked up.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
pub enum ContractName {
    TokenFactory,
    CustomToken,
    LiquidityPool,
    BurnChallenge,
}

/// A constructor argument as declared in a descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConstructorArg {
    /// A literal address.
    Address(Address),
    /// A literal unsigned integer.
    Uint(U256),
    /// A literal string.
    String(String),
    /// The deployed address of another contract of the same run.
    AddressOf(ContractName),
    /// The address of the deployer identity.
    Deployer,
}

impl fmt::Display for ConstructorArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstructorArg::Address(address) => write!(f, "{address}"),
            ConstructorArg::Uint(value) => write!(f, "{value}"),
            ConstructorArg::String(value) => write!(f, "{value:?}"),
            ConstructorArg::AddressOf(name) => write!(f, "address_of({name})"),
            ConstructorArg::Deployer => write!(f, "deployer"),
        }
    }
}

/// A constructor argument after every reference has been substituted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgValue {
    Address(Address),
    Uint(U256),
    String(String),
}

impl fmt::Display for ArgValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgValue::Address(address) => write!(f, "{address}"),
            ArgValue::Uint(value) => write!(f, "{value}"),
            ArgValue::String(value) => write!(f, "{value:?}"),
        }
    }
}

/// Static description of a single contract deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Descriptor {
    pub name: ContractName,
    pub args: Vec<ConstructorArg>,
}

impl Descriptor {
    pub fn new(name: ContractName, args: Vec<ConstructorArg>) -> Self {
        Self { name, args }
    }

    /// Contracts whose deployed address this descriptor consumes.
    pub fn dependencies(&self) -> impl Iterator<Item = ContractName> + '_ {
        self.args.iter().filter_map(|arg| match arg {
            ConstructorArg::AddressOf(name) => Some(*name),
            _ => None,
        })
    }

    /// Substitute the deployer and dependency addresses into the arguments.
    ///
    /// Fails if a dependency has not been confirmed yet or was confirmed at the
    /// zero address.
    pub fn resolve_args(
        &self,
        deployer: Address,
        confirmed: &BTreeMap<ContractName, Address>,
    ) -> Result<Vec<ArgValue>, DeployError> {
        self.args
            .iter()
            .map(|arg| match arg {
                ConstructorArg::Address(address) => Ok(ArgValue::Address(*address)),
                ConstructorArg::Uint(value) => Ok(ArgValue::Uint(*value)),
                ConstructorArg::String(value) => Ok(ArgValue::String(value.clone())),
                ConstructorArg::Deployer => Ok(ArgValue::Address(deployer)),
                ConstructorArg::AddressOf(dependency) => match confirmed.get(dependency) {
                    Some(address) if !address.is_zero() => Ok(ArgValue::Address(*address)),
                    Some(_) => Err(DeployError::deployment(
                        self.name,
                        format!("dependency {dependency} was confirmed at the zero address"),
                    )),
                    None => Err(DeployError::deployment(
                        self.name,
                        format!("dependency {dependency} is not confirmed"),
                    )),
                },
            })
            .collect()
    }
}

impl fmt::Display for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.name)?;
        for (i, arg) in self.args.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{arg}")?;
        }
        write!(f, ")")
    }
}

/// Constructor parameters of the `CustomToken` contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CustomTokenParams {
    pub name: String,
    pub symbol: String,
    /// Initial supply in whole tokens.
    pub initial_supply: u64,
    /// Decimal precision the supply is scaled by.
    pub decimals: u8,
}

impl Default for CustomTokenParams {
    fn default() -> Self {
        Self {
            name: "Custom Token Somnia".to_string(),
            symbol: "CTS".to_string(),
            initial_supply: 1_000_000,
            decimals: 18,
        }
    }
}

/// Constructor parameters of the `LiquidityPool` contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LiquidityPoolParams {
    pub fee_rate: u64,
    /// Receiver of the pool fees. Defaults to the deployer.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fee_receiver: Option<Address>,
}

impl Default for LiquidityPoolParams {
    fn default() -> Self {
        Self {
            fee_rate: 1,
            fee_receiver: None,
        }
    }
}

/// Scale a whole-token amount to the smallest unit (`amount * 10^decimals`).
pub fn parse_units(amount: u64, decimals: u8) -> Option<U256> {
    let scale = U256::from(10u8).checked_pow(U256::from(decimals))?;
    U256::from(amount).checked_mul(scale)
}

/// An ordered list of deployments.
#[derive(Debug, Clone, PartialEq, Eq, Deref)]
pub struct DeploymentPlan(Vec<Descriptor>);

impl DeploymentPlan {
    /// Build a plan from descriptors, rejecting any ordering violation.
    pub fn new(descriptors: Vec<Descriptor>) -> Result<Self, DeployError> {
        let plan = Self(descriptors);
        plan.validate()?;
        Ok(plan)
    }

    /// The four contracts of the Somnia token suite:
    /// TokenFactory, CustomToken, LiquidityPool and BurnChallenge.
    pub fn standard(
        token: &CustomTokenParams,
        pool: &LiquidityPoolParams,
    ) -> Result<Self, DeployError> {
        let supply = parse_units(token.initial_supply, token.decimals).ok_or_else(|| {
            DeployError::Plan(format!(
                "initial supply {} with {} decimals overflows uint256",
                token.initial_supply, token.decimals
            ))
        })?;

        let fee_receiver = match pool.fee_receiver {
            Some(address) => ConstructorArg::Address(address),
            None => ConstructorArg::Deployer,
        };

        Self::new(vec![
            Descriptor::new(ContractName::TokenFactory, vec![]),
            Descriptor::new(
                ContractName::CustomToken,
                vec![
                    ConstructorArg::String(token.name.clone()),
                    ConstructorArg::String(token.symbol.clone()),
                    ConstructorArg::Uint(supply),
                ],
            ),
            Descriptor::new(
                ContractName::LiquidityPool,
                vec![
                    ConstructorArg::AddressOf(ContractName::CustomToken),
                    ConstructorArg::Uint(U256::from(pool.fee_rate)),
                    fee_receiver,
                ],
            ),
            Descriptor::new(
                ContractName::BurnChallenge,
                vec![ConstructorArg::AddressOf(ContractName::TokenFactory)],
            ),
        ])
    }

    /// Check that names are unique and every dependency is deployed earlier.
    pub fn validate(&self) -> Result<(), DeployError> {
        let mut seen = HashSet::new();

        for descriptor in &self.0 {
            for dependency in descriptor.dependencies() {
                if dependency == descriptor.name {
                    return Err(DeployError::Plan(format!(
                        "{} depends on its own address",
                        descriptor.name
                    )));
                }
                if !seen.contains(&dependency) {
                    return Err(DeployError::Plan(format!(
                        "{} depends on {dependency}, which is not deployed before it",
                        descriptor.name
                    )));
                }
            }

            if !seen.insert(descriptor.name) {
                return Err(DeployError::Plan(format!(
                    "{} appears more than once",
                    descriptor.name
                )));
            }
        }

        Ok(())
    }

    /// Names of the contracts in deployment order.
    pub fn names(&self) -> Vec<ContractName> {
        self.0.iter().map(|d| d.name).collect()
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    fn standard() -> DeploymentPlan {
        DeploymentPlan::standard(&CustomTokenParams::default(), &LiquidityPoolParams::default())
            .unwrap()
    }

    #[test]
    fn test_standard_plan_order() {
        assert_eq!(
            standard().names(),
            vec![
                ContractName::TokenFactory,
                ContractName::CustomToken,
                ContractName::LiquidityPool,
                ContractName::BurnChallenge,
            ]
        );
    }

    #[test]
    fn test_standard_plan_arguments() {
        let plan = standard();

        assert!(plan[0].args.is_empty());
        assert_eq!(
            plan[1].args,
            vec![
                ConstructorArg::String("Custom Token Somnia".to_string()),
                ConstructorArg::String("CTS".to_string()),
                ConstructorArg::Uint(U256::from_str("1000000000000000000000000").unwrap()),
            ]
        );
        assert_eq!(
            plan[2].args,
            vec![
                ConstructorArg::AddressOf(ContractName::CustomToken),
                ConstructorArg::Uint(U256::from(1)),
                ConstructorArg::Deployer,
            ]
        );
        assert_eq!(
            plan[3].args,
            vec![ConstructorArg::AddressOf(ContractName::TokenFactory)]
        );
    }

    #[test]
    fn test_configured_fee_receiver() {
        let receiver = Address::repeat_byte(0x42);
        let pool = LiquidityPoolParams {
            fee_rate: 30,
            fee_receiver: Some(receiver),
        };
        let plan = DeploymentPlan::standard(&CustomTokenParams::default(), &pool).unwrap();

        assert_eq!(plan[2].args[1], ConstructorArg::Uint(U256::from(30)));
        assert_eq!(plan[2].args[2], ConstructorArg::Address(receiver));
    }

    #[test]
    fn test_forward_dependency_rejected() {
        let result = DeploymentPlan::new(vec![
            Descriptor::new(
                ContractName::BurnChallenge,
                vec![ConstructorArg::AddressOf(ContractName::TokenFactory)],
            ),
            Descriptor::new(ContractName::TokenFactory, vec![]),
        ]);

        assert!(matches!(result, Err(DeployError::Plan(_))));
    }

    #[test]
    fn test_duplicate_and_self_dependency_rejected() {
        let duplicate = DeploymentPlan::new(vec![
            Descriptor::new(ContractName::TokenFactory, vec![]),
            Descriptor::new(ContractName::TokenFactory, vec![]),
        ]);
        assert!(matches!(duplicate, Err(DeployError::Plan(_))));

        let own = DeploymentPlan::new(vec![Descriptor::new(
            ContractName::CustomToken,
            vec![ConstructorArg::AddressOf(ContractName::CustomToken)],
        )]);
        assert!(matches!(own, Err(DeployError::Plan(_))));
    }

    #[test]
    fn test_resolve_args_substitutes_addresses() {
        let plan = standard();
        let deployer = Address::repeat_byte(0xde);
        let token = Address::repeat_byte(0x01);
        let confirmed = BTreeMap::from([(ContractName::CustomToken, token)]);

        let args = plan[2].resolve_args(deployer, &confirmed).unwrap();

        assert_eq!(
            args,
            vec![
                ArgValue::Address(token),
                ArgValue::Uint(U256::from(1)),
                ArgValue::Address(deployer),
            ]
        );
    }

    #[test]
    fn test_resolve_args_requires_confirmed_dependency() {
        let plan = standard();
        let deployer = Address::repeat_byte(0xde);

        let missing = plan[3].resolve_args(deployer, &BTreeMap::new());
        assert!(matches!(missing, Err(DeployError::Deployment { .. })));

        let zero = BTreeMap::from([(ContractName::TokenFactory, Address::ZERO)]);
        let zero = plan[3].resolve_args(deployer, &zero);
        assert!(matches!(zero, Err(DeployError::Deployment { .. })));
    }

    #[test]
    fn test_parse_units() {
        assert_eq!(parse_units(1, 0), Some(U256::from(1)));
        assert_eq!(
            parse_units(1_000_000, 18),
            Some(U256::from(1_000_000u128 * 10u128.pow(18)))
        );
        assert_eq!(parse_units(u64::MAX, 77), None);
    }

    #[test]
    fn test_contract_name_parses_solidity_name() {
        for name in DeploymentPlan::standard(&Default::default(), &Default::default())
            .unwrap()
            .names()
        {
            assert_eq!(ContractName::from_str(&name.to_string()).unwrap(), name);
        }
        assert!(ContractName::from_str("Unknown").is_err());
    }

    #[test]
    fn test_descriptor_display() {
        let plan = standard();
        assert_eq!(
            plan[2].to_string(),
            "LiquidityPool(address_of(CustomToken), 1, deployer)"
        );
        assert_eq!(plan[0].to_string(), "TokenFactory()");
    }
}
