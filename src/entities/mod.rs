// Identity Registry - stable internal identities for filers and issuers
//
// Each entity has:
// - A natural key from the filings (regulatory ID for funds, CUSIP for companies)
// - An integer row id used as the foreign key by positions
// - A registry, loaded once per pass, for in-memory resolution

pub mod company;
pub mod fund;

pub use company::{get_all_companies, get_company_by_cusip, Company, CompanyRegistry};
pub use fund::{
    load_fund_seeds, parse_fund_seeds, seed_funds, strip_leading_zeros, Fund, FundRegistry,
    FundSeed,
};
